//! Error types used by the tickvisor aggregator and the offload mechanism.
//!
//! This module defines two error enums:
//!
//! - [`RegisterError`] — a component could not be registered with the aggregator.
//! - [`OffloadError`] — a background operation could not be started.
//!
//! Neither is fatal. Production and consumption failures are **not** errors in
//! this sense: they are reported through [`WorkerStatus::Error`](crate::WorkerStatus::Error)
//! and [`HandlerStatus::Error`](crate::HandlerStatus::Error) and never stop a tick.
//!
//! Both types provide `as_label` for logs/metrics.

use thiserror::Error;

use crate::{handlers::HandlerId, workers::WorkerId};

/// # Errors produced while wiring the aggregator.
///
/// The registry is left untouched when registration fails: the component that
/// was already registered under the id keeps running, the rejected one is dropped.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// A worker with this id is already registered.
    #[error("worker id {id} is already registered")]
    DuplicateWorker {
        /// The conflicting worker id.
        id: WorkerId,
    },

    /// A handler with this id is already registered.
    #[error("handler id {id} is already registered")]
    DuplicateHandler {
        /// The conflicting handler id.
        id: HandlerId,
    },
}

impl RegisterError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tickvisor::RegisterError;
    ///
    /// let err = RegisterError::DuplicateWorker { id: 3 };
    /// assert_eq!(err.as_label(), "register_duplicate_worker");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegisterError::DuplicateWorker { .. } => "register_duplicate_worker",
            RegisterError::DuplicateHandler { .. } => "register_duplicate_handler",
        }
    }
}

/// # Errors produced when a background operation cannot be started.
///
/// A failed start never marks the component as having an operation in flight;
/// the caller's tick treats the attempt as "not fresh" and may retry next tick.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffloadError {
    /// No tokio runtime was configured and none is running on this thread.
    #[error("no tokio runtime available for background work")]
    NoRuntime,

    /// The global limit of outstanding background operations is reached.
    #[error("background capacity exhausted (limit {limit})")]
    Saturated {
        /// The configured `max_concurrent` value.
        limit: usize,
    },
}

impl OffloadError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tickvisor::OffloadError;
    ///
    /// assert_eq!(OffloadError::NoRuntime.as_label(), "offload_no_runtime");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            OffloadError::NoRuntime => "offload_no_runtime",
            OffloadError::Saturated { .. } => "offload_saturated",
        }
    }
}
