use crate::Client;
use bytes::Bytes;
use http::{Method, StatusCode};
use kube_mgmt_core::{Sink, SinkError};
use serde_json::Value;
use tracing::debug;

/// Stores policy modules through the Policy API. Module ids are the sink
/// paths, so a subtree is every module whose id lies below a path.
#[derive(Clone, Debug)]
pub struct PolicySink {
    client: Client,
}

#[derive(serde::Deserialize)]
struct ListResponse {
    #[serde(default)]
    result: Vec<Module>,
}

#[derive(serde::Deserialize)]
struct Module {
    id: String,
}

// === impl PolicySink ===

impl PolicySink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, SinkError> {
        let body = self
            .client
            .send(Method::GET, self.client.url("policies", ""), None, Bytes::new(), path)
            .await?
            .check(path, &[])?;
        let ListResponse { result } =
            serde_json::from_slice(&body).map_err(|e| SinkError::Invalid {
                path: path.to_string(),
                message: format!("failed to decode policy listing: {e}"),
            })?;
        Ok(result.into_iter().map(|m| m.id).collect())
    }

    async fn delete(&self, id: &str) -> Result<(), SinkError> {
        self.client
            .send(
                Method::DELETE,
                self.client.url("policies", id),
                None,
                Bytes::new(),
                id,
            )
            .await?
            .check(id, &[StatusCode::NOT_FOUND])?;
        Ok(())
    }
}

/// Returns the ids at or below `path`.
fn subtree<'i>(ids: &'i [String], path: &str) -> Vec<&'i str> {
    let path = path.trim_matches('/');
    ids.iter()
        .map(|id| id.as_str())
        .filter(|id| {
            let id = id.trim_matches('/');
            path.is_empty()
                || id == path
                || id.strip_prefix(path).is_some_and(|rest| rest.starts_with('/'))
        })
        .collect()
}

#[async_trait::async_trait]
impl Sink for PolicySink {
    async fn put(&self, path: &str, value: Value) -> Result<(), SinkError> {
        let Value::String(module) = value else {
            return Err(SinkError::Invalid {
                path: path.to_string(),
                message: "policy modules must be text".to_string(),
            });
        };
        self.client
            .send(
                Method::PUT,
                self.client.url("policies", path),
                Some("text/plain"),
                module.into(),
                path,
            )
            .await?
            .check(path, &[])?;
        Ok(())
    }

    async fn remove_subtree(&self, path: &str) -> Result<(), SinkError> {
        let ids = self.list(path).await?;
        for id in subtree(&ids, path) {
            debug!(%id, "Deleting policy module");
            self.delete(id).await?;
        }
        Ok(())
    }
}
