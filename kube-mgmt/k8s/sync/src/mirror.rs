use crate::{Error, Replicate};
use kube_mgmt_core::{PathTree, Sink};
use kube_mgmt_k8s_api::{object_path, Resource};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

/// Replicates objects verbatim as JSON, each under its object path.
///
/// The sink is expected to be scoped to the resource type (e.g.
/// `kubernetes/pods`), so a reset replaces the sink's root.
#[derive(Clone, Debug)]
pub struct Mirror<S> {
    sink: S,
}

impl<S> Mirror<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

fn encode<K: Serialize>(path: &str, obj: &K) -> Result<Value, Error> {
    serde_json::to_value(obj).map_err(|source| Error::Encode {
        path: path.to_string(),
        source,
    })
}

#[async_trait::async_trait]
impl<K, S> Replicate<K> for Mirror<S>
where
    K: Resource + Serialize + Send + Sync + 'static,
    S: Sink,
{
    async fn reset(&mut self, objects: Vec<K>) -> Result<(), Error> {
        let mut tree = PathTree::new();
        for obj in &objects {
            let path = object_path(obj);
            tree.insert(&path, encode(&path, obj)?)?;
        }
        self.sink.put("", tree.into_value()).await?;
        Ok(())
    }

    async fn apply(&mut self, obj: K) -> Result<(), Error> {
        let path = object_path(&obj);
        trace!(%path, "Writing");
        self.sink.put(&path, encode(&path, &obj)?).await?;
        Ok(())
    }

    async fn delete(&mut self, obj: K) -> Result<(), Error> {
        let path = object_path(&obj);
        trace!(%path, "Removing");
        self.sink.remove_subtree(&path).await?;
        Ok(())
    }
}
