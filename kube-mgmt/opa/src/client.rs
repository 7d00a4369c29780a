use bytes::Bytes;
use http::{header, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client as HttpClient},
    rt::TokioExecutor,
};
use kube_mgmt_core::{join, SinkError};
use std::sync::Arc;
use tokio::time;
use tracing::trace;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the API, including the version, e.g.
    /// `http://localhost:8181/v1`.
    pub url: String,
    pub token: Option<String>,
    /// Bounds each request, including reading the response body.
    pub timeout: time::Duration,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("invalid policy engine URL {url:?}: {reason}")]
pub struct InvalidUrl {
    url: String,
    reason: String,
}

/// A shared connection pool to the policy engine.
#[derive(Clone, Debug)]
pub struct Client {
    http: HttpClient<HttpConnector, Full<Bytes>>,
    base: Arc<str>,
    token: Option<Arc<str>>,
    timeout: time::Duration,
}

/// A completed response with its body read.
#[derive(Debug)]
pub(crate) struct Response {
    pub status: StatusCode,
    pub body: Bytes,
}

/// The error document returned for failed requests.
#[derive(serde::Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

// === impl Client ===

impl Client {
    pub fn new(
        ClientConfig {
            url,
            token,
            timeout,
        }: ClientConfig,
    ) -> Result<Self, InvalidUrl> {
        let invalid = |reason: &dyn std::fmt::Display| InvalidUrl {
            url: url.clone(),
            reason: reason.to_string(),
        };
        let uri = url.parse::<Uri>().map_err(|e| invalid(&e))?;
        if uri.scheme() != Some(&http::uri::Scheme::HTTP) {
            return Err(invalid(&"only http URLs are supported"));
        }
        if uri.query().is_some() {
            return Err(invalid(&"query parameters are not supported"));
        }

        let http = HttpClient::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            http,
            base: url.trim_end_matches('/').into(),
            token: token.map(Into::into),
            timeout,
        })
    }

    /// Returns the URL of `path` within the `api` collection, e.g.
    /// `{base}/data/a/b`.
    pub(crate) fn url(&self, api: &str, path: &str) -> String {
        let path = join(api, path);
        format!("{}/{path}", self.base)
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        url: String,
        content_type: Option<&'static str>,
        body: Bytes,
        path: &str,
    ) -> Result<Response, SinkError> {
        let unreachable = |source: Box<dyn std::error::Error + Send + Sync>| SinkError::Unreachable {
            path: path.to_string(),
            source,
        };
        let invalid = |message: String| SinkError::Invalid {
            path: path.to_string(),
            message,
        };

        let mut req = Request::builder().method(method.clone()).uri(&url);
        if let Some(content_type) = content_type {
            req = req.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(token) = &self.token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = req
            .body(Full::new(body))
            .map_err(|e| invalid(e.to_string()))?;

        let exchange = async {
            let rsp = self
                .http
                .request(req)
                .await
                .map_err(|e| unreachable(e.into()))?;
            let status = rsp.status();
            let body = rsp
                .into_body()
                .collect()
                .await
                .map_err(|e| unreachable(e.into()))?
                .to_bytes();
            Ok::<_, SinkError>(Response { status, body })
        };
        let rsp = time::timeout(self.timeout, exchange)
            .await
            .map_err(|e| unreachable(e.into()))??;
        trace!(%method, %url, status = %rsp.status, "Completed request");
        Ok(rsp)
    }
}

// === impl Response ===

impl Response {
    /// Maps a non-2xx response to [`SinkError::Rejected`]. `tolerate` lists
    /// additional statuses treated as success.
    pub(crate) fn check(self, path: &str, tolerate: &[StatusCode]) -> Result<Bytes, SinkError> {
        if self.status.is_success() || tolerate.contains(&self.status) {
            return Ok(self.body);
        }
        Err(SinkError::Rejected {
            path: path.to_string(),
            status: self.status.as_u16(),
            message: error_message(self.status, &self.body),
        })
    }
}

/// Prefers the server's own description of the failure, falling back to the
/// raw body and then to the status line.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(ErrorBody { code, message }) = serde_json::from_slice::<ErrorBody>(body) {
        match (code, message) {
            (Some(code), Some(message)) => return format!("{code}: {message}"),
            (None, Some(message)) => return message,
            _ => {}
        }
    }
    match std::str::from_utf8(body).map(str::trim) {
        Ok(text) if !text.is_empty() => text.to_string(),
        _ => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn client(url: &str) -> Result<Client, InvalidUrl> {
        Client::new(ClientConfig {
            url: url.to_string(),
            token: None,
            timeout: time::Duration::from_secs(1),
        })
    }

    #[test]
    fn builds_urls_below_the_base() {
        let client = client("http://localhost:8181/v1/").expect("URL must be valid");
        assert_eq!(
            client.url("data", "kubernetes/pods"),
            "http://localhost:8181/v1/data/kubernetes/pods"
        );
        assert_eq!(
            client.url("policies", "/opa//authz/"),
            "http://localhost:8181/v1/policies/opa/authz"
        );
        assert_eq!(client.url("policies", ""), "http://localhost:8181/v1/policies");
    }

    #[test]
    fn rejects_unsupported_urls() {
        assert!(client("https://localhost:8181/v1").is_err());
        assert!(client("localhost:8181").is_err());
        assert!(client("http://localhost:8181/v1?x=y").is_err());
    }

    #[test]
    fn rejected_responses_carry_the_server_message() {
        let rsp = Response {
            status: StatusCode::BAD_REQUEST,
            body: Bytes::from_static(
                br#"{"code":"invalid_parameter","message":"error(s) occurred while compiling module(s)"}"#,
            ),
        };
        match rsp.check("opa/authz/main.rego", &[]) {
            Err(SinkError::Rejected {
                path,
                status,
                message,
            }) => {
                assert_eq!(path, "opa/authz/main.rego");
                assert_eq!(status, 400);
                assert_eq!(
                    message,
                    "invalid_parameter: error(s) occurred while compiling module(s)"
                );
            }
            res => panic!("unexpected result: {res:?}"),
        }
    }

    #[test]
    fn error_message_falls_back_to_the_body_or_status() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, b" upstream failed\n"),
            "upstream failed"
        );
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, b""),
            "500 Internal Server Error"
        );
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, br#"{"message":"missing"}"#),
            "missing"
        );
    }

    #[test]
    fn tolerated_statuses_succeed() {
        let rsp = Response {
            status: StatusCode::NOT_FOUND,
            body: Bytes::new(),
        };
        assert!(rsp.check("a/b", &[StatusCode::NOT_FOUND]).is_ok());
    }
}
