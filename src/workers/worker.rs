//! # Worker drivers: throttled production with freshness tracking.
//!
//! [`Worker`] wraps a [`Produce`] implementation, [`ProcessWorker`] wraps a
//! [`Process`] implementation. Both share one state machine.
//!
//! ## Per tick
//! ```text
//! work(now)
//!   ├─ ActivationFailed?  ─► request(true) (retry)
//!   ├─ not Active?        ─► not fresh
//!   ├─ offload running?   ─► not fresh (no new work issued)
//!   ├─ offload completed? ─► status = staged status; finish(value, staged)
//!   ├─ throttle elapsed?  ─► status = produce(..)   (may start an offload → Processing)
//!   └─ otherwise          ─► status = Idle
//!   status == Fresh       ─► last_produce = now, fresh
//! ```
//!
//! ## Rules
//! - A worker that has never produced always passes the throttle test.
//! - Leaving `Active` cancels any outstanding offload and resets the status to
//!   `Idle`, so `Fresh` is only ever reported while `Active`.
//! - The owned value is written only here, on the tick that drives the worker.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::activation::{Activate, Activation, ActivationState, Transition};
use crate::core::TickContext;
use crate::events::{Component, EventKind, publish_offload, publish_transition};
use crate::offload::{Completion, Executor, Offload};

use super::map::{DynWorker, WorkerView};
use super::produce::{Process, Produce, StagedResult, WorkContext};
use super::{WorkerId, WorkerKind, WorkerMap, WorkerStatus};

/// Throttle interval used by [`Worker::new`] and [`ProcessWorker::new`].
pub const DEFAULT_BREAK: Duration = Duration::from_millis(1000);

/// State shared by both worker kinds.
struct WorkerCore<T, S> {
    activation: Activation,
    value: T,
    status: WorkerStatus,
    break_duration: Duration,
    last_produce: Option<Duration>,
    offload: Offload<StagedResult<S>>,
}

impl<T, S: Send + 'static> WorkerCore<T, S> {
    fn new(value: T, break_duration: Duration) -> Self {
        Self {
            activation: Activation::new(),
            value,
            status: WorkerStatus::Idle,
            break_duration,
            last_produce: None,
            offload: Offload::new(),
        }
    }

    fn is_fresh(&self) -> bool {
        self.activation.is_active() && self.status == WorkerStatus::Fresh
    }

    fn is_due(&self, now: Duration) -> bool {
        match self.last_produce {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.break_duration,
        }
    }

    fn request_active<A: Activate + ?Sized>(&mut self, hooks: &mut A, want: bool) -> Transition {
        let t = self.activation.request(hooks, want);
        if t.left_active() {
            self.offload.cancel();
            self.status = WorkerStatus::Idle;
        }
        t
    }

    fn cancel_async(&mut self) -> Option<Arc<str>> {
        let label = self.offload.cancel()?;
        if self.status == WorkerStatus::Processing {
            self.status = WorkerStatus::Idle;
        }
        Some(label)
    }

    fn work<A, Prod, Fin>(
        &mut self,
        hooks: &mut A,
        id: WorkerId,
        cx: &TickContext<'_>,
        produce: Prod,
        finish: Fin,
    ) -> bool
    where
        A: Activate,
        Prod: FnOnce(&mut A, &mut WorkContext<'_, T, S>) -> WorkerStatus,
        Fin: FnOnce(&mut A, &mut T, S),
    {
        let me = Component::Worker(id);
        if self.activation.is_failed() {
            let t = self.request_active(hooks, true);
            publish_transition(cx.bus, me, t);
        }
        if !self.activation.is_active() || self.offload.is_running() {
            return false;
        }

        if let Some((label, done)) = self.offload.take_completed() {
            self.status = match done {
                Completion::Finished((status, staged)) => {
                    finish(hooks, &mut self.value, staged);
                    let reason = Some(status.as_str().to_string());
                    publish_offload(cx.bus, EventKind::AsyncCompleted, me, &label, reason);
                    status
                }
                Completion::Panicked(msg) => {
                    publish_offload(cx.bus, EventKind::AsyncPanicked, me, &label, Some(msg));
                    WorkerStatus::Error
                }
                Completion::Aborted => {
                    publish_offload(cx.bus, EventKind::AsyncAborted, me, &label, None);
                    WorkerStatus::Error
                }
            };
        } else if self.is_due(cx.now) {
            let mut wcx = WorkContext {
                id,
                now: cx.now,
                value: &mut self.value,
                offload: &mut self.offload,
                executor: cx.executor,
                bus: cx.bus,
            };
            self.status = produce(hooks, &mut wcx);
        } else {
            self.status = WorkerStatus::Idle;
        }

        if self.status == WorkerStatus::Fresh {
            self.last_produce = Some(cx.now);
            true
        } else {
            false
        }
    }
}

// Inherent API shared by `Worker` and `ProcessWorker`.
macro_rules! impl_worker_accessors {
    ($ty:ident, $bound:ident) => {
        impl<P: $bound> $ty<P> {
            /// Creates an inactive worker with the [`DEFAULT_BREAK`] throttle.
            pub fn new(producer: P, initial: P::Output) -> Self {
                Self::with_break(producer, initial, DEFAULT_BREAK)
            }

            /// Creates an inactive worker producing at most once per `break_duration`.
            pub fn with_break(producer: P, initial: P::Output, break_duration: Duration) -> Self {
                Self {
                    producer,
                    core: WorkerCore::new(initial, break_duration),
                }
            }

            /// Current value (the last produced one, or the initial value).
            pub fn value(&self) -> &P::Output {
                &self.core.value
            }

            /// The wrapped implementation.
            pub fn producer(&self) -> &P {
                &self.producer
            }

            /// Status of the last production step.
            pub fn status(&self) -> WorkerStatus {
                self.core.status
            }

            /// True if the worker is active and produced new data in its last tick.
            pub fn is_fresh(&self) -> bool {
                self.core.is_fresh()
            }

            /// Activation state machine.
            pub fn activation(&self) -> &Activation {
                &self.core.activation
            }

            /// Clock reading of the last fresh production (`None` = never).
            pub fn last_produce(&self) -> Option<Duration> {
                self.core.last_produce
            }

            /// True while a background operation is running.
            pub fn is_running(&self) -> bool {
                self.core.offload.is_running()
            }

            /// Requests the worker to be active or inactive.
            pub fn request_active(&mut self, want: bool) -> Transition {
                self.core.request_active(&mut self.producer, want)
            }

            /// Cancels the outstanding background operation; returns its label.
            pub fn cancel_async(&mut self) -> Option<Arc<str>> {
                self.core.cancel_async()
            }
        }
    };
}

/// Registered plain worker.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use tickvisor::{Activate, Produce, WorkContext, Worker, WorkerStatus};
///
/// struct Counter;
/// impl Activate for Counter {}
/// impl Produce for Counter {
///     type Output = u32;
///     type Staged = ();
///     fn produce(&mut self, cx: &mut WorkContext<'_, u32, ()>) -> WorkerStatus {
///         *cx.value_mut() += 1;
///         WorkerStatus::Fresh
///     }
/// }
///
/// let mut w = Worker::with_break(Counter, 0, Duration::from_millis(100));
/// w.request_active(true);
/// assert!(w.tick(Duration::ZERO));
/// assert!(!w.tick(Duration::from_millis(50)));
/// assert!(w.tick(Duration::from_millis(100)));
/// assert_eq!(*w.value(), 2);
/// ```
pub struct Worker<P: Produce> {
    producer: P,
    core: WorkerCore<P::Output, P::Staged>,
}

impl_worker_accessors!(Worker, Produce);

impl<P: Produce> Worker<P> {
    /// Drives one production step outside an aggregator.
    ///
    /// Background operations run on the tokio runtime of the calling thread.
    /// Returns `true` if fresh data was produced.
    pub fn tick(&mut self, now: Duration) -> bool {
        let executor = Executor::current();
        self.drive(0, &TickContext::detached(now, &executor))
    }

    fn drive(&mut self, id: WorkerId, cx: &TickContext<'_>) -> bool {
        self.core.work(
            &mut self.producer,
            id,
            cx,
            |p, wcx| p.produce(wcx),
            |p, value, staged| p.finish(value, staged),
        )
    }
}

/// Registered dependent worker.
pub struct ProcessWorker<P: Process> {
    producer: P,
    core: WorkerCore<P::Output, P::Staged>,
}

impl_worker_accessors!(ProcessWorker, Process);

impl<P: Process> ProcessWorker<P> {
    /// Drives one production step against `workers`, outside an aggregator.
    pub fn tick(&mut self, workers: &WorkerMap, now: Duration) -> bool {
        let executor = Executor::current();
        self.drive(0, workers, &TickContext::detached(now, &executor))
    }

    fn drive(&mut self, id: WorkerId, workers: &WorkerMap, cx: &TickContext<'_>) -> bool {
        self.core.work(
            &mut self.producer,
            id,
            cx,
            |p, wcx| p.produce(workers, wcx),
            |p, value, staged| p.finish(value, staged),
        )
    }
}

macro_rules! impl_worker_view {
    ($ty:ident, $bound:ident, $kind:expr) => {
        impl<P: $bound> WorkerView for $ty<P> {
            fn kind(&self) -> WorkerKind {
                $kind
            }

            fn status(&self) -> WorkerStatus {
                self.core.status
            }

            fn active_state(&self) -> ActivationState {
                self.core.activation.state()
            }

            fn activation_failures(&self) -> u32 {
                self.core.activation.failures()
            }

            fn is_fresh(&self) -> bool {
                self.core.is_fresh()
            }

            fn last_produce(&self) -> Option<Duration> {
                self.core.last_produce
            }

            fn break_duration(&self) -> Duration {
                self.core.break_duration
            }

            fn is_running(&self) -> bool {
                self.core.offload.is_running()
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

impl_worker_view!(Worker, Produce, WorkerKind::Plain);
impl_worker_view!(ProcessWorker, Process, WorkerKind::Dependent);

impl<P: Produce> DynWorker for Worker<P> {
    fn view(&self) -> &dyn WorkerView {
        self
    }

    fn request_active(&mut self, want: bool) -> Transition {
        Worker::request_active(self, want)
    }

    fn work(&mut self, id: WorkerId, _workers: Option<&WorkerMap>, cx: &TickContext<'_>) -> bool {
        self.drive(id, cx)
    }

    fn cancel_async(&mut self) -> Option<Arc<str>> {
        self.core.cancel_async()
    }
}

impl<P: Process> DynWorker for ProcessWorker<P> {
    fn view(&self) -> &dyn WorkerView {
        self
    }

    fn request_active(&mut self, want: bool) -> Transition {
        ProcessWorker::request_active(self, want)
    }

    fn work(&mut self, id: WorkerId, workers: Option<&WorkerMap>, cx: &TickContext<'_>) -> bool {
        let empty = WorkerMap::default();
        self.drive(id, workers.unwrap_or(&empty), cx)
    }

    fn cancel_async(&mut self) -> Option<Arc<str>> {
        self.core.cancel_async()
    }
}
