use crate::Client;
use bytes::Bytes;
use http::{Method, StatusCode};
use kube_mgmt_core::{Sink, SinkError};
use serde_json::{json, Value};

/// Stores JSON documents through the Data API.
#[derive(Clone, Debug)]
pub struct DataSink {
    client: Client,
}

impl DataSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Removes the document the request is addressed to.
fn remove_patch() -> Bytes {
    json!([{ "op": "remove", "path": "/" }]).to_string().into()
}

#[async_trait::async_trait]
impl Sink for DataSink {
    async fn put(&self, path: &str, value: Value) -> Result<(), SinkError> {
        let body = serde_json::to_vec(&value).map_err(|e| SinkError::Invalid {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        self.client
            .send(
                Method::PUT,
                self.client.url("data", path),
                Some("application/json"),
                body.into(),
                path,
            )
            .await?
            .check(path, &[])?;
        Ok(())
    }

    async fn remove_subtree(&self, path: &str) -> Result<(), SinkError> {
        self.client
            .send(
                Method::PATCH,
                self.client.url("data", path),
                Some("application/json-patch+json"),
                remove_patch(),
                path,
            )
            .await?
            .check(path, &[StatusCode::NOT_FOUND])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_patch_targets_the_addressed_document() {
        let patch: Value = serde_json::from_slice(&remove_patch()).expect("patch must be JSON");
        assert_eq!(patch, json!([{ "op": "remove", "path": "/" }]));
    }
}
