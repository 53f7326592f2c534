//! # Events emitted by the aggregator and its components.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Wiring events**: registration and registration conflicts
//! - **Activation events**: the lifecycle of each worker/handler
//! - **Offload events**: background operations started, finished, cancelled
//! - **Aggregator events**: tick completion and shutdown
//!
//! The [`Event`] struct carries metadata such as timestamps, the component the
//! event concerns, the background task label and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use tickvisor::{Component, Event, EventKind};
//!
//! let ev = Event::new(EventKind::ActivationFailed)
//!     .with_component(Component::Worker(2))
//!     .with_retry(true)
//!     .with_tick(41);
//!
//! assert_eq!(ev.kind, EventKind::ActivationFailed);
//! assert_eq!(ev.component, Some(Component::Worker(2)));
//! assert_eq!(ev.tick, Some(41));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::{handlers::HandlerId, workers::WorkerId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Wiring ===
    /// A worker, handler or supervisor was registered.
    ///
    /// Sets `component` (absent for supervisors) and `reason` (supervisor name).
    Registered,

    /// A registration was rejected because the id is taken.
    ///
    /// Sets `component` and `reason` (error label).
    RegistrationConflict,

    // === Activation ===
    /// Activation succeeded.
    ///
    /// Sets `component`, `retry`.
    Activated,

    /// Activation hook returned failure; the component will be retried.
    ///
    /// Sets `component`, `retry`.
    ActivationFailed,

    /// The component was deactivated.
    ///
    /// Sets `component`.
    Deactivated,

    // === Offload ===
    /// A background operation was accepted.
    ///
    /// Sets `component`, `label`.
    AsyncStarted,

    /// A background operation finished and its result was merged on the main tick.
    ///
    /// Sets `component`, `label`, `reason` (merged status).
    AsyncCompleted,

    /// A background operation panicked; merged as an error status.
    ///
    /// Sets `component`, `label`, `reason` (panic message).
    AsyncPanicked,

    /// A background operation ended without a result (the runtime dropped it);
    /// merged as an error status.
    ///
    /// Sets `component`, `label`.
    AsyncAborted,

    /// A background operation could not be started.
    ///
    /// Sets `component`, `label`, `reason` (error label).
    AsyncStartFailed,

    /// An outstanding background operation was cancelled.
    ///
    /// Sets `component`, `label`.
    AsyncCancelled,

    // === Aggregator ===
    /// One orchestration tick finished.
    ///
    /// Sets `tick`, `fresh`, `handled` (whether handlers ran).
    TickCompleted,

    /// The run loop stopped; all components were cancelled and deactivated.
    ShutdownCompleted,

    // === Subscribers ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `reason`.
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets `reason`.
    SubscriberPanicked,
}

/// Registry identity of the component an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// A worker (producer) by id.
    Worker(WorkerId),
    /// A handler (consumer) by id.
    Handler(HandlerId),
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Worker(id) => write!(f, "worker#{id}"),
            Component::Handler(id) => write!(f, "handler#{id}"),
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Component the event concerns, if any.
    pub component: Option<Component>,
    /// Label of the background operation.
    pub label: Option<Arc<str>>,
    /// Human-readable reason (status, error label, panic message).
    pub reason: Option<Arc<str>>,
    /// Whether an activation attempt was a retry.
    pub retry: Option<bool>,
    /// Tick number (1-based) the event was raised in.
    pub tick: Option<u64>,
    /// Whether any worker produced fresh data in the tick.
    pub fresh: Option<bool>,
    /// Whether handlers were invoked in the tick.
    pub handled: Option<bool>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            component: None,
            label: None,
            reason: None,
            retry: None,
            tick: None,
            fresh: None,
            handled: None,
        }
    }

    /// Attaches the component identity.
    #[inline]
    pub fn with_component(mut self, component: Component) -> Self {
        self.component = Some(component);
        self
    }

    /// Attaches a background task label.
    #[inline]
    pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Marks whether an activation attempt was a retry.
    #[inline]
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Attaches a tick number.
    #[inline]
    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Attaches the tick outcome flags.
    #[inline]
    pub fn with_outcome(mut self, fresh: bool, handled: bool) -> Self {
        self.fresh = Some(fresh);
        self.handled = Some(handled);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}
