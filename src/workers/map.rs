//! # Worker registry.
//!
//! [`WorkerMap`] owns every registered worker, keyed by [`WorkerId`], in
//! ascending id order. Consumers and observers get a shared `&WorkerMap` and
//! reach a worker's typed value through [`WorkerMap::worker`] or
//! [`WorkerMap::process_worker`].
//!
//! ## Rules
//! - Ids are unique; [`WorkerMap::insert`] refuses a duplicate and leaves the
//!   registered worker untouched.
//! - Iteration order is ascending id order.

use std::any::Any;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use crate::activation::{ActivationState, Transition};
use crate::core::TickContext;

use super::produce::{Process, Produce};
use super::worker::{ProcessWorker, Worker};
use super::{WorkerId, WorkerKind, WorkerStatus};

/// Read-only view of a registered worker, independent of its value type.
pub trait WorkerView: Any {
    /// Which contract the worker follows.
    fn kind(&self) -> WorkerKind;
    /// Status of the last production step.
    fn status(&self) -> WorkerStatus;
    /// Current activation state.
    fn active_state(&self) -> ActivationState;
    /// Consecutive failed activation attempts.
    fn activation_failures(&self) -> u32;
    /// True if active and produced new data in its last tick.
    fn is_fresh(&self) -> bool;
    /// Clock reading of the last fresh production.
    fn last_produce(&self) -> Option<Duration>;
    /// Throttle interval.
    fn break_duration(&self) -> Duration;
    /// True while a background operation is running.
    fn is_running(&self) -> bool;
    /// Upcast for typed lookups.
    fn as_any(&self) -> &dyn Any;
}

/// Object-safe driver used by the aggregator.
pub(crate) trait DynWorker: WorkerView + Send {
    fn view(&self) -> &dyn WorkerView;
    fn request_active(&mut self, want: bool) -> Transition;
    fn work(&mut self, id: WorkerId, workers: Option<&WorkerMap>, cx: &TickContext<'_>) -> bool;
    fn cancel_async(&mut self) -> Option<Arc<str>>;
}

/// Registered workers, keyed by id.
#[derive(Default)]
pub struct WorkerMap {
    workers: BTreeMap<WorkerId, Box<dyn DynWorker>>,
}

impl WorkerMap {
    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True if no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: WorkerId) -> bool {
        self.workers.contains_key(&id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.workers.keys().copied()
    }

    /// Untyped view of worker `id`.
    pub fn get(&self, id: WorkerId) -> Option<&dyn WorkerView> {
        self.workers.get(&id).map(|w| w.view())
    }

    /// Iterates `(id, view)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (WorkerId, &dyn WorkerView)> + '_ {
        self.workers.iter().map(|(id, w)| (*id, w.view()))
    }

    /// Typed lookup of a plain worker.
    ///
    /// Returns `None` if `id` is not registered or holds a different type.
    pub fn worker<P: Produce>(&self, id: WorkerId) -> Option<&Worker<P>> {
        self.get(id)?.as_any().downcast_ref::<Worker<P>>()
    }

    /// Typed lookup of a dependent worker.
    pub fn process_worker<P: Process>(&self, id: WorkerId) -> Option<&ProcessWorker<P>> {
        self.get(id)?.as_any().downcast_ref::<ProcessWorker<P>>()
    }

    /// True if any worker reported something other than `Idle` in its last tick.
    pub fn any_updates(&self) -> bool {
        self.workers.values().any(|w| w.status() != WorkerStatus::Idle)
    }

    /// True if any worker is fresh.
    pub fn any_fresh(&self) -> bool {
        self.workers.values().any(|w| w.is_fresh())
    }

    pub(crate) fn insert(&mut self, id: WorkerId, worker: Box<dyn DynWorker>) -> bool {
        match self.workers.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(worker);
                true
            }
        }
    }

    pub(crate) fn get_mut(&mut self, id: WorkerId) -> Option<&mut (dyn DynWorker + 'static)> {
        self.workers.get_mut(&id).map(|w| w.as_mut())
    }

    /// Removes worker `id` for the duration of its own step.
    pub(crate) fn take(&mut self, id: WorkerId) -> Option<Box<dyn DynWorker>> {
        self.workers.remove(&id)
    }

    pub(crate) fn restore(&mut self, id: WorkerId, worker: Box<dyn DynWorker>) {
        self.workers.insert(id, worker);
    }

    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (WorkerId, &mut (dyn DynWorker + 'static))> + '_ {
        self.workers.iter_mut().map(|(id, w)| (*id, w.as_mut()))
    }
}

impl std::fmt::Debug for WorkerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.workers.iter().map(|(id, w)| (id, w.status())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activate;
    use crate::workers::WorkContext;

    struct Temp;
    impl Activate for Temp {}
    impl Produce for Temp {
        type Output = f32;
        type Staged = ();
        fn produce(&mut self, cx: &mut WorkContext<'_, f32, ()>) -> WorkerStatus {
            *cx.value_mut() = 21.5;
            WorkerStatus::Fresh
        }
    }

    struct Label;
    impl Activate for Label {}
    impl Produce for Label {
        type Output = String;
        type Staged = ();
        fn produce(&mut self, _cx: &mut WorkContext<'_, String, ()>) -> WorkerStatus {
            WorkerStatus::Idle
        }
    }

    fn map() -> WorkerMap {
        let mut m = WorkerMap::default();
        assert!(m.insert(7, Box::new(Worker::new(Label, "x".to_string()))));
        assert!(m.insert(2, Box::new(Worker::new(Temp, 0.0))));
        m
    }

    #[test]
    fn test_typed_lookup() {
        let m = map();
        assert_eq!(m.worker::<Temp>(2).map(|w| *w.value()), Some(0.0));
        assert_eq!(m.worker::<Label>(7).map(|w| w.value().as_str()), Some("x"));
        assert!(m.worker::<Label>(2).is_none(), "wrong type");
        assert!(m.worker::<Temp>(3).is_none(), "unknown id");
    }

    #[test]
    fn test_duplicate_insert_keeps_original() {
        let mut m = map();
        assert!(!m.insert(2, Box::new(Worker::new(Label, "dup".to_string()))));
        assert!(m.worker::<Temp>(2).is_some());
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_iteration_in_id_order() {
        let m = map();
        assert_eq!(m.ids().collect::<Vec<_>>(), vec![2, 7]);
        assert_eq!(m.get(7).map(|v| v.kind()), Some(WorkerKind::Plain));
    }

    #[test]
    fn test_any_updates_tracks_status() {
        let mut m = map();
        assert!(!m.any_updates());

        let executor = crate::offload::Executor::current();
        let cx = TickContext::detached(Duration::ZERO, &executor);
        for (_, w) in m.iter_mut() {
            w.request_active(true);
        }
        let ids: Vec<_> = m.ids().collect();
        for id in ids {
            if let Some(w) = m.get_mut(id) {
                w.work(id, None, &cx);
            }
        }
        assert!(m.any_updates());
        assert!(m.any_fresh());
        assert!(m.get(2).is_some_and(|w| w.is_fresh()));
        assert!(m.get(7).is_some_and(|w| !w.is_fresh()));
    }
}
