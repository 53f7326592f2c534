use std::fmt;

/// Result code of a handler's last invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum HandlerStatus {
    /// Not invoked, or nothing to do.
    #[default]
    Idle,
    /// The fresh data was consumed.
    DataHandled,
    /// Consumption failed.
    Error,
    /// A background operation is consuming the data.
    Processing,
}

impl HandlerStatus {
    /// Returns a short stable label for logs/metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerStatus::Idle => "idle",
            HandlerStatus::DataHandled => "data_handled",
            HandlerStatus::Error => "error",
            HandlerStatus::Processing => "processing",
        }
    }
}

impl fmt::Display for HandlerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
