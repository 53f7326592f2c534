//! # Consumption contract.
//!
//! A handler reacts to fresh data. The aggregator hands it the worker registry
//! (read-only) and a [`HandleContext`] through which the step can be offloaded.
//!
//! A background consumption job returns the handler's final [`HandlerStatus`];
//! any data it needs must be copied into the job before it starts.

use std::future::Future;
use std::sync::Arc;

use crate::activation::Activate;
use crate::error::OffloadError;
use crate::events::{Bus, Component, EventKind, publish_offload};
use crate::offload::{Executor, Offload, Started};
use crate::workers::WorkerMap;

use super::{HandlerId, HandlerStatus};

/// A consumer of fresh worker data.
///
/// # Example
/// ```
/// use tickvisor::{Activate, Handle, HandleContext, HandlerStatus, WorkerMap};
///
/// struct Printer;
/// impl Activate for Printer {}
///
/// impl Handle for Printer {
///     fn handle(&mut self, workers: &WorkerMap, _cx: &mut HandleContext<'_>) -> HandlerStatus {
///         for (id, w) in workers.iter() {
///             if w.is_fresh() {
///                 println!("worker {id} has news");
///             }
///         }
///         HandlerStatus::DataHandled
///     }
/// }
/// ```
pub trait Handle: Activate + Send + 'static {
    /// Consumes the current worker values.
    ///
    /// Called only when active, triggered by the aggregator, and not waiting on
    /// a background operation.
    fn handle(&mut self, workers: &WorkerMap, cx: &mut HandleContext<'_>) -> HandlerStatus;
}

/// Offload access for one consumption step.
pub struct HandleContext<'a> {
    pub(crate) id: HandlerId,
    pub(crate) offload: &'a mut Offload<HandlerStatus>,
    pub(crate) executor: &'a Executor,
    pub(crate) bus: Option<&'a Bus>,
}

impl HandleContext<'_> {
    /// Registry id of the handler.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Offloads the rest of this step to a background future.
    ///
    /// Returns [`HandlerStatus::Processing`] when accepted (or when one is
    /// already outstanding) and [`HandlerStatus::Error`] when it cannot start.
    pub fn start_async<F>(&mut self, label: impl Into<Arc<str>>, job: F) -> HandlerStatus
    where
        F: Future<Output = HandlerStatus> + Send + 'static,
    {
        let label = label.into();
        let res = self.offload.start(self.executor, Arc::clone(&label), job);
        self.started(label, res)
    }

    /// Offloads the rest of this step to a blocking closure.
    pub fn start_blocking<F>(&mut self, label: impl Into<Arc<str>>, job: F) -> HandlerStatus
    where
        F: FnOnce() -> HandlerStatus + Send + 'static,
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
    ) -> HandlerStatus {
        let me = Component::Handler(self.id);
        match res {
            Ok(Started::New) => {
                publish_offload(self.bus, EventKind::AsyncStarted, me, &label, None);
                HandlerStatus::Processing
            }
            Ok(Started::AlreadyRunning) => HandlerStatus::Processing,
            Err(e) => {
                let reason = Some(e.as_label().to_string());
                publish_offload(self.bus, EventKind::AsyncStartFailed, me, &label, reason);
                HandlerStatus::Error
            }
        }
    }
}
