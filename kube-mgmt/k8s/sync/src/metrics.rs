use crate::Fault;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct SyncMetrics {
    resets: Family<ResourceLabels, Counter>,
    applies: Family<ResourceLabels, Counter>,
    deletes: Family<ResourceLabels, Counter>,
    faults: Family<FaultLabels, Counter>,
}

/// Counters for a single watched resource.
#[derive(Clone, Debug, Default)]
pub struct ResourceMetrics {
    resource: String,
    resets: Counter,
    applies: Counter,
    deletes: Counter,
    faults: Family<FaultLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResourceLabels {
    resource: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FaultLabels {
    resource: String,
    fault: &'static str,
}

// === impl SyncMetrics ===

impl SyncMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let resets = Family::default();
        reg.register(
            "resets",
            "Count of snapshots loaded into the policy engine",
            resets.clone(),
        );

        let applies = Family::default();
        reg.register(
            "applies",
            "Count of added or modified objects written to the policy engine",
            applies.clone(),
        );

        let deletes = Family::default();
        reg.register(
            "deletes",
            "Count of deleted objects removed from the policy engine",
            deletes.clone(),
        );

        let faults = Family::default();
        reg.register(
            "faults",
            "Count of sync cycles ended, by cause",
            faults.clone(),
        );

        Self {
            resets,
            applies,
            deletes,
            faults,
        }
    }

    pub fn resource(&self, resource: impl ToString) -> ResourceMetrics {
        let labels = ResourceLabels {
            resource: resource.to_string(),
        };
        ResourceMetrics {
            resets: self.resets.get_or_create(&labels).clone(),
            applies: self.applies.get_or_create(&labels).clone(),
            deletes: self.deletes.get_or_create(&labels).clone(),
            faults: self.faults.clone(),
            resource: labels.resource,
        }
    }
}

// === impl ResourceMetrics ===

impl ResourceMetrics {
    pub(crate) fn reset(&self) {
        self.resets.inc();
    }

    pub(crate) fn apply(&self) {
        self.applies.inc();
    }

    pub(crate) fn delete(&self) {
        self.deletes.inc();
    }

    pub(crate) fn fault(&self, fault: Fault) {
        self.faults
            .get_or_create(&FaultLabels {
                resource: self.resource.clone(),
                fault: fault.as_str(),
            })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn faults(&self, fault: Fault) -> u64 {
        self.faults
            .get_or_create(&FaultLabels {
                resource: self.resource.clone(),
                fault: fault.as_str(),
            })
            .get()
    }

    #[cfg(test)]
    pub(crate) fn resets(&self) -> u64 {
        self.resets.get()
    }

    #[cfg(test)]
    pub(crate) fn applies(&self) -> u64 {
        self.applies.get()
    }
}
