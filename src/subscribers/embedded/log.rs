//! # LogWriter: renders events through `tracing`.
//!
//! ## Example output (with a `tracing_subscriber::fmt` collector)
//! ```text
//! INFO  tickvisor: activated component=worker#1 retry=false
//! WARN  tickvisor: activation failed component=handler#2 retry=true
//! DEBUG tickvisor: async started component=worker#3 label="serial-read"
//! INFO  tickvisor: async completed component=worker#3 label="serial-read" status="fresh"
//! TRACE tickvisor: tick tick=17 fresh=true handled=true
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that forwards every event to `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let component = e.component.map(|c| c.to_string()).unwrap_or_default();
        let label = e.label.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");
        let retry = e.retry.unwrap_or(false);

        match e.kind {
            EventKind::Registered => {
                tracing::info!(target: "tickvisor", %component, reason, "registered");
            }
            EventKind::RegistrationConflict => {
                tracing::warn!(target: "tickvisor", %component, reason, "registration rejected");
            }
            EventKind::Activated => {
                tracing::info!(target: "tickvisor", %component, retry, "activated");
            }
            EventKind::ActivationFailed => {
                tracing::warn!(target: "tickvisor", %component, retry, "activation failed");
            }
            EventKind::Deactivated => {
                tracing::info!(target: "tickvisor", %component, "deactivated");
            }
            EventKind::AsyncStarted => {
                tracing::debug!(target: "tickvisor", %component, label, "async started");
            }
            EventKind::AsyncCompleted => {
                tracing::info!(target: "tickvisor", %component, label, status = reason, "async completed");
            }
            EventKind::AsyncPanicked => {
                tracing::error!(target: "tickvisor", %component, label, reason, "async panicked");
            }
            EventKind::AsyncAborted => {
                tracing::error!(target: "tickvisor", %component, label, "async aborted");
            }
            EventKind::AsyncStartFailed => {
                tracing::warn!(target: "tickvisor", %component, label, reason, "async start failed");
            }
            EventKind::AsyncCancelled => {
                tracing::debug!(target: "tickvisor", %component, label, "async cancelled");
            }
            EventKind::TickCompleted => {
                tracing::trace!(
                    target: "tickvisor",
                    tick = e.tick.unwrap_or(0),
                    fresh = e.fresh.unwrap_or(false),
                    handled = e.handled.unwrap_or(false),
                    "tick"
                );
            }
            EventKind::ShutdownCompleted => {
                tracing::info!(target: "tickvisor", "shutdown completed");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "tickvisor", reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "tickvisor", reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
