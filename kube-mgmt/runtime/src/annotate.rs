use anyhow::{Context, Result};
use kube_mgmt_k8s_api::{Api, Client, ConfigMap, Patch, PatchParams, ResourceExt};
use kube_mgmt_k8s_sync::Annotate;
use serde_json::json;
use tokio::time;

/// Writes status annotations onto ConfigMaps with a merge patch, so that no
/// other field of the object is touched.
#[derive(Clone)]
pub struct ApiAnnotator {
    client: Client,
    timeout: time::Duration,
}

impl ApiAnnotator {
    pub fn new(client: Client, timeout: time::Duration) -> Self {
        Self { client, timeout }
    }
}

fn annotation_patch(key: &str, value: &str) -> Patch<serde_json::Value> {
    Patch::Merge(json!({
        "metadata": {
            "annotations": { key: value },
        },
    }))
}

#[async_trait::async_trait]
impl Annotate<ConfigMap> for ApiAnnotator {
    async fn annotate(&self, cm: &ConfigMap, key: &str, value: &str) -> Result<()> {
        let ns = cm.namespace().unwrap_or_default();
        let name = cm.name_any();
        let api = Api::<ConfigMap>::namespaced(self.client.clone(), &ns);
        let patch = annotation_patch(key, value);

        time::timeout(
            self.timeout,
            api.patch(&name, &PatchParams::default(), &patch),
        )
        .await
        .with_context(|| format!("timed out patching {ns}/{name}"))?
        .with_context(|| format!("failed to patch {ns}/{name}"))?;
        Ok(())
    }
}
