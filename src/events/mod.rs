//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the aggregator, workers, handlers
//! and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`Component`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Aggregator` (wiring, ticks, shutdown), worker/handler
//!   drivers (activation, offload), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the listener spawned by `AggregatorBuilder::build`, which
//!   fans out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Component, Event, EventKind};

use std::sync::Arc;

use crate::activation::Transition;

/// Publishes the event describing an activation transition, if any.
pub(crate) fn publish_transition(bus: Option<&Bus>, component: Component, t: Transition) {
    let Some(bus) = bus else { return };
    let ev = match t {
        Transition::Activated { retry } => Event::new(EventKind::Activated).with_retry(retry),
        Transition::Failed { retry } => Event::new(EventKind::ActivationFailed).with_retry(retry),
        Transition::Deactivated => Event::new(EventKind::Deactivated),
        Transition::Unchanged => return,
    };
    bus.publish(ev.with_component(component));
}

/// Publishes an offload event for `component`.
pub(crate) fn publish_offload(
    bus: Option<&Bus>,
    kind: EventKind,
    component: Component,
    label: &Arc<str>,
    reason: Option<String>,
) {
    let Some(bus) = bus else { return };
    let mut ev = Event::new(kind)
        .with_component(component)
        .with_label(Arc::clone(label));
    if let Some(reason) = reason {
        ev = ev.with_reason(reason);
    }
    bus.publish(ev);
}
