//! # Handler driver.
//!
//! ```text
//! tick(workers)
//!   ├─ ActivationFailed?  ─► request(true) (retry)
//!   └─ Active?
//!        ├─ offload running?   ─► keep Processing
//!        ├─ offload completed? ─► status = staged status
//!        └─ otherwise          ─► status = handle(workers, cx)
//! ```
//!
//! Handlers have no throttle; the aggregator decides when they are triggered.

use std::any::Any;
use std::sync::Arc;

use crate::activation::{Activation, ActivationState, Transition};
use crate::core::TickContext;
use crate::events::{Component, EventKind, publish_offload, publish_transition};
use crate::offload::{Completion, Executor, Offload};
use crate::workers::WorkerMap;

use super::map::{DynHandler, HandlerView};
use super::{Handle, HandleContext, HandlerId, HandlerStatus};

/// Registered consumer.
pub struct Handler<H: Handle> {
    inner: H,
    activation: Activation,
    status: HandlerStatus,
    offload: Offload<HandlerStatus>,
}

impl<H: Handle> Handler<H> {
    /// Wraps `inner` as an inactive handler.
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            activation: Activation::new(),
            status: HandlerStatus::Idle,
            offload: Offload::new(),
        }
    }

    /// The wrapped implementation.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Status of the last invocation.
    pub fn status(&self) -> HandlerStatus {
        self.status
    }

    /// Activation state machine.
    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    /// True while a background operation is running.
    pub fn is_running(&self) -> bool {
        self.offload.is_running()
    }

    /// Requests the handler to be active or inactive.
    pub fn request_active(&mut self, want: bool) -> Transition {
        let t = self.activation.request(&mut self.inner, want);
        if t.left_active() {
            self.offload.cancel();
            self.status = HandlerStatus::Idle;
        }
        t
    }

    /// Cancels the outstanding background operation; returns its label.
    pub fn cancel_async(&mut self) -> Option<Arc<str>> {
        let label = self.offload.cancel()?;
        if self.status == HandlerStatus::Processing {
            self.status = HandlerStatus::Idle;
        }
        Some(label)
    }

    /// Runs one consumption step against `workers`, outside an aggregator.
    pub fn tick(&mut self, workers: &WorkerMap) {
        let executor = Executor::current();
        self.drive(0, workers, &TickContext::detached(Default::default(), &executor));
    }

    fn drive(&mut self, id: HandlerId, workers: &WorkerMap, cx: &TickContext<'_>) {
        let me = Component::Handler(id);
        if self.activation.is_failed() {
            let t = self.request_active(true);
            publish_transition(cx.bus, me, t);
        }
        if !self.activation.is_active() || self.offload.is_running() {
            return;
        }

        if let Some((label, done)) = self.offload.take_completed() {
            self.status = match done {
                Completion::Finished(status) => {
                    let reason = Some(status.as_str().to_string());
                    publish_offload(cx.bus, EventKind::AsyncCompleted, me, &label, reason);
                    status
                }
                Completion::Panicked(msg) => {
                    publish_offload(cx.bus, EventKind::AsyncPanicked, me, &label, Some(msg));
                    HandlerStatus::Error
                }
                Completion::Aborted => {
                    publish_offload(cx.bus, EventKind::AsyncAborted, me, &label, None);
                    HandlerStatus::Error
                }
            };
            return;
        }

        let mut hcx = HandleContext {
            id,
            offload: &mut self.offload,
            executor: cx.executor,
            bus: cx.bus,
        };
        self.status = self.inner.handle(workers, &mut hcx);
    }
}

impl<H: Handle> HandlerView for Handler<H> {
    fn status(&self) -> HandlerStatus {
        self.status
    }

    fn active_state(&self) -> ActivationState {
        self.activation.state()
    }

    fn activation_failures(&self) -> u32 {
        self.activation.failures()
    }

    fn is_running(&self) -> bool {
        self.offload.is_running()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<H: Handle> DynHandler for Handler<H> {
    fn view(&self) -> &dyn HandlerView {
        self
    }

    fn request_active(&mut self, want: bool) -> Transition {
        Handler::request_active(self, want)
    }

    fn work(&mut self, id: HandlerId, workers: &WorkerMap, cx: &TickContext<'_>) {
        self.drive(id, workers, cx)
    }

    fn cancel_async(&mut self) -> Option<Arc<str>> {
        Handler::cancel_async(self)
    }
}
