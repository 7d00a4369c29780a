use crate::tree::join;
use serde_json::Value;
use std::sync::Arc;

/// A writable document store, addressed by `/`-separated paths.
///
/// Every call is a single atomic write from the caller's point of view.
/// Removing a path that does not exist succeeds.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    /// Replaces whatever is stored at `path` with `value`.
    async fn put(&self, path: &str, value: Value) -> Result<(), SinkError>;

    /// Removes `path` and everything below it.
    async fn remove_subtree(&self, path: &str) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{message}")]
    Rejected {
        path: String,
        status: u16,
        message: String,
    },

    #[error("policy engine unreachable: {source}")]
    Unreachable {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("{path}: {message}")]
    Invalid { path: String, message: String },
}

/// Scopes a [`Sink`] below a fixed path prefix.
#[derive(Clone, Debug)]
pub struct Prefixed<S> {
    prefix: String,
    inner: S,
}

// === impl Prefixed ===

impl<S> Prefixed<S> {
    pub fn new(inner: S, prefix: impl AsRef<str>) -> Self {
        Self {
            prefix: join(prefix.as_ref(), ""),
            inner,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Nests a further prefix below this one.
    pub fn nest(self, prefix: impl AsRef<str>) -> Self {
        Self {
            prefix: join(&self.prefix, prefix.as_ref()),
            inner: self.inner,
        }
    }
}

#[async_trait::async_trait]
impl<S: Sink> Sink for Prefixed<S> {
    async fn put(&self, path: &str, value: Value) -> Result<(), SinkError> {
        self.inner.put(&join(&self.prefix, path), value).await
    }

    async fn remove_subtree(&self, path: &str) -> Result<(), SinkError> {
        self.inner.remove_subtree(&join(&self.prefix, path)).await
    }
}

#[async_trait::async_trait]
impl<S: Sink + ?Sized> Sink for Arc<S> {
    async fn put(&self, path: &str, value: Value) -> Result<(), SinkError> {
        (**self).put(path, value).await
    }

    async fn remove_subtree(&self, path: &str) -> Result<(), SinkError> {
        (**self).remove_subtree(path).await
    }
}
