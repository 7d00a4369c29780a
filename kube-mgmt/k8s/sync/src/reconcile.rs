use crate::{Backoff, BackoffConfig, Error, Fault, ResourceMetrics};
use futures::prelude::*;
use kube_mgmt_k8s_api::{Event, Snapshot, Watcher};
use std::marker::PhantomData;
use tokio::time;
use tracing::{debug, info, warn};

/// Applies the objects of one resource type to the policy engine.
#[async_trait::async_trait]
pub trait Replicate<K>: Send {
    /// Replaces everything previously written with the given listing.
    async fn reset(&mut self, objects: Vec<K>) -> Result<(), Error>;

    /// Writes an added or modified object.
    async fn apply(&mut self, object: K) -> Result<(), Error>;

    /// Removes a deleted object.
    async fn delete(&mut self, object: K) -> Result<(), Error>;
}

/// Drives a [`Watcher`] into a [`Replicate`] until shutdown.
///
/// Each cycle lists the resource, resets the replica from that listing and
/// then applies watch events, one at a time and in the order they arrive,
/// starting at the listing's resource version. When a cycle ends, the
/// [`Backoff`] decides how long to wait before listing again. A successful
/// listing alone does not restart the backoff sequence; the watch must
/// deliver an event or close cleanly first.
pub struct Reconciler<K, W, R> {
    resource: String,
    watcher: W,
    replica: R,
    backoff: Backoff,
    metrics: ResourceMetrics,
    _object: PhantomData<fn(K)>,
}

// === impl Reconciler ===

impl<K, W, R> Reconciler<K, W, R>
where
    K: Send + 'static,
    W: Watcher<K>,
    R: Replicate<K>,
{
    pub fn new(
        resource: impl ToString,
        watcher: W,
        replica: R,
        backoff: BackoffConfig,
        metrics: ResourceMetrics,
    ) -> Self {
        Self {
            resource: resource.to_string(),
            watcher,
            replica,
            backoff: Backoff::new(backoff),
            metrics,
            _object: PhantomData,
        }
    }

    /// Runs sync cycles until `shutdown` is signaled.
    pub async fn run(mut self, shutdown: drain::Watch) {
        info!(resource = %self.resource, "Syncing");

        let shutdown = shutdown.signaled();
        tokio::pin!(shutdown);

        loop {
            let fault = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                fault = self.sync() => fault,
            };
            self.metrics.fault(fault);

            let delay = self.backoff.next(fault);
            if delay.is_zero() {
                debug!(resource = %self.resource, "Restarting");
                continue;
            }
            info!(resource = %self.resource, ?delay, "Restarting after delay");

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = time::sleep(delay) => {}
            }
        }

        info!(resource = %self.resource, "Sync finished");
    }

    async fn sync(&mut self) -> Fault {
        match self.try_sync().await {
            Ok(()) => Fault::Closed,
            Err(Error::Watch(error)) if error.is_expired() => {
                info!(resource = %self.resource, %error, "Resource version expired");
                Fault::Transport
            }
            Err(error) => {
                let fault = error.fault();
                match fault {
                    Fault::Sink => {
                        warn!(resource = %self.resource, %error, "Sync failed due to policy engine error")
                    }
                    _ => warn!(resource = %self.resource, %error, "Sync failed due to cluster API error"),
                }
                fault
            }
        }
    }

    async fn try_sync(&mut self) -> Result<(), Error> {
        let start = time::Instant::now();
        let Snapshot {
            objects,
            resource_version,
        } = self.watcher.list().await?;
        let count = objects.len();

        self.replica.reset(objects).await?;
        self.metrics.reset();
        info!(
            resource = %self.resource,
            objects = count,
            elapsed = ?start.elapsed(),
            "Loaded snapshot"
        );

        let mut events = self.watcher.watch(&resource_version).await?;
        while let Some(event) = events.next().await {
            let event = event?;
            debug!(resource = %self.resource, event = event.kind(), "Applying");
            match event {
                Event::Added(obj) | Event::Modified(obj) => {
                    self.replica.apply(obj).await?;
                    self.metrics.apply();
                }
                Event::Deleted(obj) => {
                    self.replica.delete(obj).await?;
                    self.metrics.delete();
                }
            }
            // The watch is healthy, so a later cluster fault starts the
            // backoff sequence over.
            self.backoff.reset();
        }

        debug!(resource = %self.resource, "Watch closed");
        self.backoff.reset();
        Ok(())
    }
}
