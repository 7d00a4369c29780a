use futures::prelude::*;
use kube::{
    api::{ListParams, WatchEvent, WatchParams},
    Api,
};
use kube_mgmt_k8s_api::{Event, EventStream, Snapshot, WatchError, Watcher};
use serde::de::DeserializeOwned;
use std::fmt;

/// The server closes watches after this many seconds, which bounds how long
/// a silently broken connection goes unnoticed.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Lists and watches one resource type through the Kubernetes API.
#[derive(Clone)]
pub struct ApiWatcher<K> {
    api: Api<K>,
}

impl<K> ApiWatcher<K> {
    pub fn new(api: Api<K>) -> Self {
        Self { api }
    }
}

fn convert<K>(event: kube::Result<WatchEvent<K>>) -> Option<Result<Event<K>, WatchError>> {
    match event {
        Ok(WatchEvent::Added(obj)) => Some(Ok(Event::Added(obj))),
        Ok(WatchEvent::Modified(obj)) => Some(Ok(Event::Modified(obj))),
        Ok(WatchEvent::Deleted(obj)) => Some(Ok(Event::Deleted(obj))),
        Ok(WatchEvent::Bookmark(_)) => None,
        Ok(WatchEvent::Error(status)) => Some(Err(WatchError::Api {
            code: status.code,
            message: status.message,
        })),
        Err(error) => Some(Err(error.into())),
    }
}

#[async_trait::async_trait]
impl<K> Watcher<K> for ApiWatcher<K>
where
    K: Clone + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
{
    async fn list(&self) -> Result<Snapshot<K>, WatchError> {
        let list = self.api.list(&ListParams::default()).await?;
        Ok(Snapshot {
            objects: list.items,
            resource_version: list.metadata.resource_version.unwrap_or_default(),
        })
    }

    async fn watch(&self, resource_version: &str) -> Result<EventStream<K>, WatchError> {
        let params = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        let events = self.api.watch(&params, resource_version).await?;
        Ok(events
            .filter_map(|event| future::ready(convert(event)))
            .boxed())
    }
}
