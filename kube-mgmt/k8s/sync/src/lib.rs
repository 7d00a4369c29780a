#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod backoff;
pub mod classify;
pub mod configmap;
mod metrics;
mod mirror;
mod reconcile;


pub use self::{
    backoff::{Backoff, BackoffConfig, Fault},
    classify::{Classifier, ClassifierConfig, Role},
    configmap::{Annotate, ContentSync},
    metrics::{ResourceMetrics, SyncMetrics},
    mirror::Mirror,
    reconcile::{Reconciler, Replicate},
};
use kube_mgmt_core::{SinkError, TreeError};
use kube_mgmt_k8s_api::WatchError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Policy engine failures are treated as transient; everything else is
    /// blamed on the cluster API.
    pub fn fault(&self) -> Fault {
        match self {
            Self::Sink(_) => Fault::Sink,
            Self::Watch(_) | Self::Tree(_) | Self::Encode { .. } => Fault::Transport,
        }
    }
}
