//! # Production contracts.
//!
//! A worker's behaviour is supplied by one of two traits:
//! - [`Produce`] — a plain worker; generates its value from its own inputs.
//! - [`Process`] — a dependent worker; additionally reads the current values of
//!   the other registered workers.
//!
//! Both receive a [`WorkContext`] that exposes the worker's owned value and the
//! means to offload the step to a background operation.
//!
//! ## Offloading
//! ```text
//! produce()                              later tick
//!   └─► cx.start_async("read", job) ──►  job: 'static, owns its inputs
//!         returns Processing             returns (WorkerStatus, Staged)
//!                                               │
//!                                        finish(value, staged)   (main tick)
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::activation::Activate;
use crate::error::OffloadError;
use crate::events::{Bus, Component, EventKind, publish_offload};
use crate::offload::{Executor, Offload, Started};

use super::{WorkerId, WorkerMap, WorkerStatus};

/// Result a background production step hands back to the main tick.
pub type StagedResult<S> = (WorkerStatus, S);

/// A plain worker: produces a typed value on a throttle.
///
/// # Example
/// ```
/// use tickvisor::{Activate, Produce, WorkContext, WorkerStatus};
///
/// struct Counter;
/// impl Activate for Counter {}
///
/// impl Produce for Counter {
///     type Output = u32;
///     type Staged = ();
///
///     fn produce(&mut self, cx: &mut WorkContext<'_, u32, ()>) -> WorkerStatus {
///         *cx.value_mut() += 1;
///         WorkerStatus::Fresh
///     }
/// }
/// ```
pub trait Produce: Activate + Send + 'static {
    /// The value this worker owns and publishes.
    type Output: Send + 'static;
    /// The result type of a background step (`()` when never offloading).
    type Staged: Send + 'static;

    /// Produces the next value. Called only when active, not waiting on a
    /// background operation, and the throttle interval has elapsed.
    fn produce(&mut self, cx: &mut WorkContext<'_, Self::Output, Self::Staged>) -> WorkerStatus;

    /// Merges a completed background step into the owned value.
    ///
    /// Runs on the main tick, before the merged status is evaluated.
    fn finish(&mut self, _value: &mut Self::Output, _staged: Self::Staged) {}
}

/// A dependent worker: produces from other workers' current values.
///
/// Dependent workers run after every plain worker of the tick, so `workers`
/// holds this tick's values. The worker itself is not visible in `workers`
/// while its own step runs.
pub trait Process: Activate + Send + 'static {
    /// The value this worker owns and publishes.
    type Output: Send + 'static;
    /// The result type of a background step (`()` when never offloading).
    type Staged: Send + 'static;

    /// Produces the next value from `workers`.
    fn produce(
        &mut self,
        workers: &WorkerMap,
        cx: &mut WorkContext<'_, Self::Output, Self::Staged>,
    ) -> WorkerStatus;

    /// Merges a completed background step into the owned value.
    fn finish(&mut self, _value: &mut Self::Output, _staged: Self::Staged) {}
}

/// Access to a worker's owned value and offload slot during one production step.
pub struct WorkContext<'a, T, S> {
    pub(crate) id: WorkerId,
    pub(crate) now: Duration,
    pub(crate) value: &'a mut T,
    pub(crate) offload: &'a mut Offload<StagedResult<S>>,
    pub(crate) executor: &'a Executor,
    pub(crate) bus: Option<&'a Bus>,
}

impl<T, S: Send + 'static> WorkContext<'_, T, S> {
    /// Registry id of the worker.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Clock reading of the current tick.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// The worker's current value.
    pub fn value(&self) -> &T {
        &*self.value
    }

    /// Mutable access to the worker's value (main tick only).
    pub fn value_mut(&mut self) -> &mut T {
        &mut *self.value
    }

    /// Offloads the rest of this step to a background future.
    ///
    /// Returns [`WorkerStatus::Processing`] when the operation is accepted (or
    /// one is already outstanding) and [`WorkerStatus::Error`] when it cannot be
    /// started. Return the result from `produce`.
    pub fn start_async<F>(&mut self, label: impl Into<Arc<str>>, job: F) -> WorkerStatus
    where
        F: Future<Output = StagedResult<S>> + Send + 'static,
    {
        let label = label.into();
        let res = self.offload.start(self.executor, Arc::clone(&label), job);
        self.started(label, res)
    }

    /// Offloads the rest of this step to a blocking closure.
    ///
    /// Same contract as [`start_async`](Self::start_async).
    pub fn start_blocking<F>(&mut self, label: impl Into<Arc<str>>, job: F) -> WorkerStatus
    where
        F: FnOnce() -> StagedResult<S> + Send + 'static,
    {
        let label = label.into();
        let res = self
            .offload
            .start_blocking(self.executor, Arc::clone(&label), job);
        self.started(label, res)
    }

    fn started(
        &self,
        label: Arc<str>,
        res: Result<Started, OffloadError>,
    ) -> WorkerStatus {
        let me = Component::Worker(self.id);
        match res {
            Ok(Started::New) => {
                publish_offload(self.bus, EventKind::AsyncStarted, me, &label, None);
                WorkerStatus::Processing
            }
            Ok(Started::AlreadyRunning) => WorkerStatus::Processing,
            Err(e) => {
                publish_offload(
                    self.bus,
                    EventKind::AsyncStartFailed,
                    me,
                    &label,
                    Some(e.as_label().to_string()),
                );
                WorkerStatus::Error
            }
        }
    }
}
