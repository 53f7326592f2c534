//! # Supervisors: read-only observers of each tick.
//!
//! Every registered [`Supervise`] implementation runs at the end of every tick,
//! in registration order, whether or not anything happened. It sees both
//! registries read-only and may keep private bookkeeping (e.g. counting ticks
//! a worker has spent in `ActivationFailed`).
//!
//! ## Example
//! ```
//! use tickvisor::{ActivationState, HandlerMap, Supervise, WorkerMap};
//!
//! #[derive(Default)]
//! struct StuckDetector {
//!     failing_ticks: u32,
//! }
//!
//! impl Supervise for StuckDetector {
//!     fn supervise(&mut self, workers: &WorkerMap, _handlers: &HandlerMap) {
//!         let failing = workers
//!             .iter()
//!             .any(|(_, w)| w.active_state() == ActivationState::ActivationFailed);
//!         self.failing_ticks = if failing { self.failing_ticks + 1 } else { 0 };
//!     }
//! }
//! ```

use crate::handlers::HandlerMap;
use crate::workers::WorkerMap;

/// Final-stage observer invoked once per tick.
pub trait Supervise: Send + 'static {
    /// Called once, when the supervisor is registered.
    fn initialize(&mut self) {}

    /// Inspects the outcome of the tick that just ran.
    fn supervise(&mut self, workers: &WorkerMap, handlers: &HandlerMap);

    /// Name used in registration events.
    ///
    /// The default uses `type_name::<Self>()`.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
