use std::fmt;

/// Result code of a worker's last production step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum WorkerStatus {
    /// Nothing new this tick (throttled, inactive, or nothing to report).
    #[default]
    Idle,
    /// New data was produced this tick.
    Fresh,
    /// Production failed this tick.
    Error,
    /// A background operation is producing the next value.
    Processing,
}

impl WorkerStatus {
    /// Returns a short stable label for logs/metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Fresh => "fresh",
            WorkerStatus::Error => "error",
            WorkerStatus::Processing => "processing",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which production contract a registered worker follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// Produces from its own inputs ([`Produce`](crate::Produce)).
    Plain,
    /// Produces from other workers' current values ([`Process`](crate::Process)).
    Dependent,
}
