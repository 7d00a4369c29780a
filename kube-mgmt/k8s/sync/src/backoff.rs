use tokio::time::Duration;

/// Why a sync cycle ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Listing or watching the cluster API failed.
    Transport,
    /// The policy engine rejected a write or could not be reached.
    Sink,
    /// The server closed the watch. Not an error.
    Closed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    pub min: Duration,
    pub max: Duration,
}

/// Decides how long to wait before the next sync cycle.
///
/// Cluster API failures back off exponentially from `min` to `max`; policy
/// engine failures wait `min` and restart the sequence; a closed watch is
/// restarted immediately.
#[derive(Clone, Debug)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    next: Duration,
}

// === impl Fault ===

impl Fault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Sink => "sink",
            Self::Closed => "closed",
        }
    }
}

// === impl BackoffConfig ===

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

// === impl Backoff ===

impl Backoff {
    pub fn new(BackoffConfig { min, max }: BackoffConfig) -> Self {
        let min = min.min(max);
        Self { min, max, next: min }
    }

    pub fn next(&mut self, fault: Fault) -> Duration {
        match fault {
            Fault::Transport => {
                let delay = self.next;
                self.next = delay.saturating_mul(2).min(self.max);
                delay
            }
            Fault::Sink => {
                self.next = self.min;
                self.min
            }
            Fault::Closed => Duration::ZERO,
        }
    }

    /// Called once a cycle makes progress, so only consecutive failures
    /// grow the delay.
    pub fn reset(&mut self) {
        self.next = self.min;
    }
}

impl From<BackoffConfig> for Backoff {
    fn from(config: BackoffConfig) -> Self {
        Self::new(config)
    }
}
