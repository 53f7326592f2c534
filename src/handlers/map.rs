//! Handler registry.

use std::any::Any;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use crate::activation::{ActivationState, Transition};
use crate::core::TickContext;
use crate::workers::WorkerMap;

use super::{Handle, Handler, HandlerId, HandlerStatus};

/// Read-only view of a registered handler.
pub trait HandlerView: Any {
    /// Status of the last invocation.
    fn status(&self) -> HandlerStatus;
    /// Current activation state.
    fn active_state(&self) -> ActivationState;
    /// Consecutive failed activation attempts.
    fn activation_failures(&self) -> u32;
    /// True while a background operation is running.
    fn is_running(&self) -> bool;
    /// Upcast for typed lookups.
    fn as_any(&self) -> &dyn Any;
}

pub(crate) trait DynHandler: HandlerView + Send {
    fn view(&self) -> &dyn HandlerView;
    fn request_active(&mut self, want: bool) -> Transition;
    fn work(&mut self, id: HandlerId, workers: &WorkerMap, cx: &TickContext<'_>);
    fn cancel_async(&mut self) -> Option<Arc<str>>;
}

/// Registered handlers, keyed by id, iterated in ascending id order.
#[derive(Default)]
pub struct HandlerMap {
    handlers: BTreeMap<HandlerId, Box<dyn DynHandler>>,
}

impl HandlerMap {
    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: HandlerId) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = HandlerId> + '_ {
        self.handlers.keys().copied()
    }

    /// Untyped view of handler `id`.
    pub fn get(&self, id: HandlerId) -> Option<&dyn HandlerView> {
        self.handlers.get(&id).map(|h| h.view())
    }

    /// Iterates `(id, view)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (HandlerId, &dyn HandlerView)> + '_ {
        self.handlers.iter().map(|(id, h)| (*id, h.view()))
    }

    /// Typed lookup; `None` if `id` is unknown or holds a different type.
    pub fn handler<H: Handle>(&self, id: HandlerId) -> Option<&Handler<H>> {
        self.get(id)?.as_any().downcast_ref::<Handler<H>>()
    }

    /// True if any handler is waiting on a background operation.
    pub fn any_processing(&self) -> bool {
        self.handlers
            .values()
            .any(|h| h.status() == HandlerStatus::Processing)
    }

    pub(crate) fn insert(&mut self, id: HandlerId, handler: Box<dyn DynHandler>) -> bool {
        match self.handlers.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handler);
                true
            }
        }
    }

    pub(crate) fn get_mut(&mut self, id: HandlerId) -> Option<&mut (dyn DynHandler + 'static)> {
        self.handlers.get_mut(&id).map(|h| h.as_mut())
    }

    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (HandlerId, &mut (dyn DynHandler + 'static))> + '_ {
        self.handlers.iter_mut().map(|(id, h)| (*id, h.as_mut()))
    }
}

impl std::fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(id, h)| (id, h.status())))
            .finish()
    }
}
