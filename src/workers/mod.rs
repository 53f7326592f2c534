//! # Workers: throttled producers of typed values.
//!
//! A worker owns one value of its output type and refreshes it at most once
//! per break interval. Two contracts exist:
//!
//! - [`Produce`] → wrapped in [`Worker`]: plain, runs first in every tick
//! - [`Process`] → wrapped in [`ProcessWorker`]: dependent, runs after all plain
//!   workers and reads their values through [`WorkerMap`]
//!
//! ```text
//!   Worker<P> / ProcessWorker<P>
//!   ├─ Activation          (Inactive / Active / ActivationFailed)
//!   ├─ value: P::Output    (written on the main tick only)
//!   ├─ status: WorkerStatus
//!   ├─ break + last_produce (throttle)
//!   └─ Offload             (single-flight background step)
//! ```

mod map;
mod produce;
mod status;
mod worker;

pub use map::{WorkerMap, WorkerView};
pub use produce::{Process, Produce, StagedResult, WorkContext};
pub use status::{WorkerKind, WorkerStatus};
pub use worker::{DEFAULT_BREAK, ProcessWorker, Worker};

pub(crate) use map::DynWorker;

/// Registry key of a worker.
pub type WorkerId = u8;
