use crate::{Classifier, Error, Replicate, Role};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use kube_mgmt_core::{Sink, SinkError, SyncStatus};
use kube_mgmt_k8s_api::{object_path, ConfigMap, ResourceExt};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Writes a single annotation onto an object, leaving every other field as
/// it is.
#[async_trait::async_trait]
pub trait Annotate<K>: Send + Sync {
    async fn annotate(&self, obj: &K, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Loads the entries of selected ConfigMaps into the policy engine.
///
/// Every entry of a policy ConfigMap is written as a policy module at
/// `{namespace}/{name}/{key}`; every entry of a data ConfigMap is parsed as
/// JSON and written as a document at the same path. The outcome is reported
/// back on the ConfigMap as a status annotation.
pub struct ContentSync<P, D, A> {
    classifier: Classifier,
    policies: P,
    data: D,
    annotator: A,
    synced: HashMap<String, Synced>,
    annotated: HashMap<String, Annotated>,
}

/// What was last written for an object path.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Synced {
    role: Role,
    keys: BTreeSet<String>,
}

/// The last status annotation written for an object path.
#[derive(Clone, Debug)]
struct Annotated {
    resource_version: Option<String>,
    key: &'static str,
    value: String,
}

// === impl ContentSync ===

impl<P, D, A> ContentSync<P, D, A>
where
    P: Sink,
    D: Sink,
    A: Annotate<ConfigMap>,
{
    pub fn new(classifier: Classifier, policies: P, data: D, annotator: A) -> Self {
        Self {
            classifier,
            policies,
            data,
            annotator,
            synced: HashMap::new(),
            annotated: HashMap::new(),
        }
    }

    fn sink(&self, role: Role) -> &dyn Sink {
        match role {
            Role::Policy => &self.policies,
            Role::Data => &self.data,
        }
    }

    async fn load(&mut self, path: &str, role: Role, cm: &ConfigMap) -> Result<(), Error> {
        let entries = cm.data.clone().unwrap_or_default();

        let stale = match self.synced.get(path).cloned() {
            Some(prev) if prev.role != role => {
                debug!(%path, from = %prev.role, to = %role, "Role changed");
                self.unload(path).await?;
                Vec::new()
            }
            Some(prev) => prev
                .keys
                .into_iter()
                .filter(|k| !entries.contains_key(k))
                .collect(),
            None => Vec::new(),
        };

        let mut errors = Vec::new();
        let mut fault = None;
        for key in stale {
            let key_path = format!("{path}/{key}");
            if let Err(error) = self.sink(role).remove_subtree(&key_path).await {
                warn!(path = %key_path, %error, "Failed to remove stale entry");
                errors.push(error.to_string());
                fault.get_or_insert(error);
            }
        }

        let mut keys = BTreeSet::new();
        for (key, value) in entries {
            let key_path = format!("{path}/{key}");
            let doc = match role {
                Role::Policy => Value::String(value),
                Role::Data => match serde_json::from_str(&value) {
                    Ok(doc) => doc,
                    Err(error) => {
                        warn!(path = %key_path, %error, "Failed to parse data entry as JSON");
                        errors.push(format!("{key}: {error}"));
                        continue;
                    }
                },
            };
            match self.sink(role).put(&key_path, doc).await {
                Ok(()) => {
                    keys.insert(key);
                }
                Err(error) => {
                    warn!(path = %key_path, %error, "Failed to write entry");
                    errors.push(error.to_string());
                    fault.get_or_insert(error);
                }
            }
        }

        // Keys that failed may have been written by an earlier load, so keep
        // tracking them until they are removed.
        if let Some(prev) = self.synced.get(path) {
            if prev.role == role {
                keys.extend(prev.keys.iter().filter(|k| cm_has_key(cm, k)).cloned());
            }
        }
        self.synced.insert(path.to_string(), Synced { role, keys });

        let status = if errors.is_empty() {
            SyncStatus::Ok
        } else {
            SyncStatus::error(errors.join("; "))
        };
        if status.is_ok() {
            info!(%path, %role, "Loaded");
        }
        self.annotate(path, role, cm, &status).await;

        match fault {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    /// Removes everything written for `path`, if anything.
    async fn unload(&mut self, path: &str) -> Result<(), Error> {
        let Some(role) = self.synced.get(path).map(|s| s.role) else {
            return Ok(());
        };
        self.remove(path, role).await?;
        self.synced.remove(path);
        Ok(())
    }

    async fn remove(&self, path: &str, role: Role) -> Result<(), SinkError> {
        self.sink(role).remove_subtree(path).await?;
        info!(%path, %role, "Removed");
        Ok(())
    }

    async fn annotate(&mut self, path: &str, role: Role, cm: &ConfigMap, status: &SyncStatus) {
        let key = role.status_annotation();
        let value = status.to_annotation();
        if cm.annotations().get(key) == Some(&value) {
            return;
        }

        let written = Annotated {
            resource_version: cm.resource_version(),
            key,
            value,
        };
        if self
            .annotated
            .get(path)
            .is_some_and(|prior| prior.is_same(&written))
        {
            return;
        }

        match self.annotator.annotate(cm, key, &written.value).await {
            Ok(()) => {
                debug!(%path, annotation = %written.value, "Annotated");
                self.annotated.insert(path.to_string(), written);
            }
            Err(error) => warn!(%path, %error, "Failed to annotate"),
        }
    }
}

// === impl Annotated ===

impl Annotated {
    /// The same value was already written onto this version of the object.
    fn is_same(&self, other: &Self) -> bool {
        self.resource_version.is_some()
            && self.resource_version == other.resource_version
            && self.key == other.key
            && self.value == other.value
    }
}

fn cm_has_key(cm: &ConfigMap, key: &str) -> bool {
    cm.data.as_ref().is_some_and(|d| d.contains_key(key))
}

#[async_trait::async_trait]
impl<P, D, A> Replicate<ConfigMap> for ContentSync<P, D, A>
where
    P: Sink,
    D: Sink,
    A: Annotate<ConfigMap>,
{
    async fn reset(&mut self, objects: Vec<ConfigMap>) -> Result<(), Error> {
        let listed = objects.iter().map(object_path).collect::<HashSet<_>>();
        let stale = self
            .synced
            .keys()
            .filter(|path| !listed.contains(*path))
            .cloned()
            .collect::<Vec<_>>();
        for path in stale {
            self.unload(&path).await?;
            self.annotated.remove(&path);
        }

        // Load every object even if one fails, then report the first failure.
        let mut result = Ok(());
        for cm in objects {
            if let Err(error) = self.apply(cm).await {
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }
        result
    }

    async fn apply(&mut self, cm: ConfigMap) -> Result<(), Error> {
        let path = object_path(&cm);
        match self.classifier.classify(&cm) {
            Some(role) => self.load(&path, role, &cm).await,
            None => self.unload(&path).await,
        }
    }

    async fn delete(&mut self, cm: ConfigMap) -> Result<(), Error> {
        let path = object_path(&cm);
        self.annotated.remove(&path);
        if self.synced.contains_key(&path) {
            return self.unload(&path).await;
        }
        // Not written during this process's lifetime, but it may have been
        // loaded before a restart.
        if let Some(role) = self.classifier.classify(&cm) {
            self.remove(&path, role).await?;
        }
        Ok(())
    }
}
