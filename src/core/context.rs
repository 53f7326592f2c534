use std::time::Duration;

use crate::events::Bus;
use crate::offload::Executor;

/// Per-tick environment handed to every worker and handler of one tick.
pub(crate) struct TickContext<'a> {
    /// Clock reading shared by the whole tick.
    pub now: Duration,
    /// Starts background operations.
    pub executor: &'a Executor,
    /// Event sink; `None` when a component is driven outside an aggregator.
    pub bus: Option<&'a Bus>,
}

impl<'a> TickContext<'a> {
    /// Context for driving a single component by hand.
    pub fn detached(now: Duration, executor: &'a Executor) -> Self {
        Self {
            now,
            executor,
            bus: None,
        }
    }
}
