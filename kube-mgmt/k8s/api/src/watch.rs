use futures::prelude::*;
use std::pin::Pin;

/// A consistent listing of every object of one resource type.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<T> {
    pub objects: Vec<T>,
    /// The resource version at which the listing was taken. Watches resume
    /// from here so that nothing already in the listing is replayed.
    pub resource_version: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    Client(#[from] kube::Error),

    #[error("watch failed with status {code}: {message}")]
    Api { code: u16, message: String },
}

/// An ordered stream of changes. The stream ending means the server closed
/// the watch; it is not an error.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<Event<T>, WatchError>> + Send + 'static>>;

/// Supplies an initial listing and the changes that follow it for one
/// resource type.
#[async_trait::async_trait]
pub trait Watcher<T>: Send + Sync {
    async fn list(&self) -> Result<Snapshot<T>, WatchError>;

    async fn watch(&self, resource_version: &str) -> Result<EventStream<T>, WatchError>;
}

// === impl Event ===

impl<T> Event<T> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
        }
    }
}

// === impl WatchError ===

impl WatchError {
    /// True when the requested resource version is no longer available and
    /// the caller must list again.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Api { code: 410, .. })
    }
}

#[async_trait::async_trait]
impl<T, W> Watcher<T> for std::sync::Arc<W>
where
    T: Send + 'static,
    W: Watcher<T> + ?Sized,
{
    async fn list(&self) -> Result<Snapshot<T>, WatchError> {
        (**self).list().await
    }

    async fn watch(&self, resource_version: &str) -> Result<EventStream<T>, WatchError> {
        (**self).watch(resource_version).await
    }
}
