//! # Aggregator: owns the registries and drives orchestration ticks.
//!
//! The [`Aggregator`] owns every worker, handler and supervisor, the event
//! [`Bus`], the background [`Executor`] and the [`Clock`]. Membership is fixed
//! after setup; there is no runtime add/remove.
//!
//! ## One tick
//! ```text
//! run_tick()
//!   now = clock.now()                          (one reading for the whole tick)
//!   1. plain workers, ascending id ──────────► fresh |= work(now)
//!   2. dependent workers, ascending id ──────► fresh |= work(now, &workers)
//!   3. fresh || any handler Processing ?
//!        yes ─► every handler, ascending id ─► tick(&workers)
//!        no  ─► skipped
//!   4. every supervisor, registration order ─► supervise(&workers, &handlers)
//!   5. publish TickCompleted { tick, fresh, handled }
//! ```
//!
//! ## Rules
//! - Dependent workers observe values produced in the same tick.
//! - Handlers are triggered iff some worker was fresh this tick or some handler
//!   still has a background operation to merge.
//! - Supervisors run on every tick.
//! - Nothing in the tick path returns an error: failures are status codes and events.
//!
//! ## Example
//! ```
//! use std::time::Duration;
//! use tickvisor::{
//!     Activate, Aggregator, AggregatorConfig, Handle, HandleContext, HandlerStatus,
//!     Handler, ManualClock, Produce, WorkContext, Worker, WorkerMap, WorkerStatus,
//! };
//!
//! struct Counter;
//! impl Activate for Counter {}
//! impl Produce for Counter {
//!     type Output = u32;
//!     type Staged = ();
//!     fn produce(&mut self, cx: &mut WorkContext<'_, u32, ()>) -> WorkerStatus {
//!         *cx.value_mut() += 1;
//!         WorkerStatus::Fresh
//!     }
//! }
//!
//! struct Print;
//! impl Activate for Print {}
//! impl Handle for Print {
//!     fn handle(&mut self, workers: &WorkerMap, _cx: &mut HandleContext<'_>) -> HandlerStatus {
//!         let count = workers.worker::<Counter>(1).map(|w| *w.value());
//!         println!("count = {count:?}");
//!         HandlerStatus::DataHandled
//!     }
//! }
//!
//! let clock = ManualClock::new();
//! let mut agg = Aggregator::builder(AggregatorConfig::default())
//!     .with_clock(clock.clone())
//!     .build();
//! agg.register_worker(1, Worker::with_break(Counter, 0, Duration::from_millis(100))).unwrap();
//! agg.register_handler(1, Handler::new(Print)).unwrap();
//! agg.activate_all();
//!
//! assert!(agg.run_tick().fresh);
//! clock.advance(Duration::from_millis(50));
//! assert!(!agg.run_tick().handlers_ran);
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::activation::Transition;
use crate::clock::Clock;
use crate::core::{AggregatorBuilder, AggregatorConfig, TickContext};
use crate::error::RegisterError;
use crate::events::{Bus, Component, Event, EventKind, publish_offload, publish_transition};
use crate::handlers::{Handle, Handler, HandlerId, HandlerMap};
use crate::offload::Executor;
use crate::supervisors::Supervise;
use crate::workers::{
    DynWorker, Process, ProcessWorker, Produce, Worker, WorkerId, WorkerKind, WorkerMap,
};

/// Outcome of one [`Aggregator::run_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Clock reading shared by the tick.
    pub now: Duration,
    /// True if at least one worker produced fresh data.
    pub fresh: bool,
    /// True if handlers were invoked.
    pub handlers_ran: bool,
}

/// Owner of the registries; drives ticks.
pub struct Aggregator {
    cfg: AggregatorConfig,
    bus: Bus,
    executor: Executor,
    clock: Arc<dyn Clock>,
    workers: WorkerMap,
    dependents: BTreeSet<WorkerId>,
    handlers: HandlerMap,
    supervisors: Vec<Box<dyn Supervise>>,
    ticks: u64,
    listener: CancellationToken,
}

impl Aggregator {
    /// Returns a builder for an aggregator with the given configuration.
    pub fn builder(cfg: AggregatorConfig) -> AggregatorBuilder {
        AggregatorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: AggregatorConfig,
        bus: Bus,
        executor: Executor,
        clock: Arc<dyn Clock>,
        listener: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            executor,
            clock,
            workers: WorkerMap::default(),
            dependents: BTreeSet::new(),
            handlers: HandlerMap::default(),
            supervisors: Vec::new(),
            ticks: 0,
            listener,
        }
    }

    // === Registration ===

    /// Registers a plain worker under `id`. The worker starts inactive.
    ///
    /// A duplicate id is rejected: the registered worker is kept and `worker`
    /// is dropped.
    pub fn register_worker<P: Produce>(
        &mut self,
        id: WorkerId,
        worker: Worker<P>,
    ) -> Result<(), RegisterError> {
        self.insert_worker(id, Box::new(worker))
    }

    /// Registers a dependent worker under `id`. The worker starts inactive.
    pub fn register_process_worker<P: Process>(
        &mut self,
        id: WorkerId,
        worker: ProcessWorker<P>,
    ) -> Result<(), RegisterError> {
        self.insert_worker(id, Box::new(worker))?;
        self.dependents.insert(id);
        Ok(())
    }

    /// Registers a handler under `id`. The handler starts inactive.
    pub fn register_handler<H: Handle>(
        &mut self,
        id: HandlerId,
        handler: Handler<H>,
    ) -> Result<(), RegisterError> {
        let me = Component::Handler(id);
        if !self.handlers.insert(id, Box::new(handler)) {
            return Err(self.conflict(me, RegisterError::DuplicateHandler { id }));
        }
        self.bus
            .publish(Event::new(EventKind::Registered).with_component(me));
        Ok(())
    }

    /// Registers a supervisor and runs its `initialize` hook.
    ///
    /// Supervisors run in registration order.
    pub fn register_supervisor(&mut self, mut supervisor: impl Supervise) {
        supervisor.initialize();
        self.bus
            .publish(Event::new(EventKind::Registered).with_reason(supervisor.name()));
        self.supervisors.push(Box::new(supervisor));
    }

    fn insert_worker(&mut self, id: WorkerId, worker: Box<dyn DynWorker>) -> Result<(), RegisterError> {
        let me = Component::Worker(id);
        if !self.workers.insert(id, worker) {
            return Err(self.conflict(me, RegisterError::DuplicateWorker { id }));
        }
        self.bus
            .publish(Event::new(EventKind::Registered).with_component(me));
        Ok(())
    }

    fn conflict(&self, me: Component, err: RegisterError) -> RegisterError {
        self.bus.publish(
            Event::new(EventKind::RegistrationConflict)
                .with_component(me)
                .with_reason(err.as_label()),
        );
        err
    }

    // === Activation ===

    /// Requests worker `id` to be active or inactive.
    ///
    /// Returns `None` if no worker is registered under `id`.
    pub fn set_worker_active(&mut self, id: WorkerId, want: bool) -> Option<Transition> {
        let t = self.workers.get_mut(id)?.request_active(want);
        publish_transition(Some(&self.bus), Component::Worker(id), t);
        Some(t)
    }

    /// Requests handler `id` to be active or inactive.
    ///
    /// Returns `None` if no handler is registered under `id`.
    pub fn set_handler_active(&mut self, id: HandlerId, want: bool) -> Option<Transition> {
        let t = self.handlers.get_mut(id)?.request_active(want);
        publish_transition(Some(&self.bus), Component::Handler(id), t);
        Some(t)
    }

    /// Requests every registered worker and handler to be active.
    pub fn activate_all(&mut self) {
        self.set_all_active(true);
    }

    fn set_all_active(&mut self, want: bool) {
        for (id, w) in self.workers.iter_mut() {
            let t = w.request_active(want);
            publish_transition(Some(&self.bus), Component::Worker(id), t);
        }
        for (id, h) in self.handlers.iter_mut() {
            let t = h.request_active(want);
            publish_transition(Some(&self.bus), Component::Handler(id), t);
        }
    }

    // === Offload control ===

    /// Cancels worker `id`'s outstanding background operation; returns its label.
    pub fn cancel_worker_async(&mut self, id: WorkerId) -> Option<Arc<str>> {
        let label = self.workers.get_mut(id)?.cancel_async()?;
        publish_offload(Some(&self.bus), EventKind::AsyncCancelled, Component::Worker(id), &label, None);
        Some(label)
    }

    /// Cancels handler `id`'s outstanding background operation; returns its label.
    pub fn cancel_handler_async(&mut self, id: HandlerId) -> Option<Arc<str>> {
        let label = self.handlers.get_mut(id)?.cancel_async()?;
        publish_offload(Some(&self.bus), EventKind::AsyncCancelled, Component::Handler(id), &label, None);
        Some(label)
    }

    /// True if any worker or handler has a background operation running.
    pub fn has_pending_async(&self) -> bool {
        self.workers.iter().any(|(_, w)| w.is_running())
            || self.handlers.iter().any(|(_, h)| h.is_running())
    }

    // === Ticks ===

    /// Runs one orchestration tick.
    pub fn run_tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let cx = TickContext {
            now,
            executor: &self.executor,
            bus: Some(&self.bus),
        };

        let mut fresh = false;
        for (id, w) in self.workers.iter_mut() {
            if w.kind() == WorkerKind::Plain {
                fresh |= w.work(id, None, &cx);
            }
        }
        for &id in &self.dependents {
            let Some(mut w) = self.workers.take(id) else {
                continue;
            };
            fresh |= w.work(id, Some(&self.workers), &cx);
            self.workers.restore(id, w);
        }

        let handlers_ran = fresh || self.handlers.any_processing();
        if handlers_ran {
            for (id, h) in self.handlers.iter_mut() {
                h.work(id, &self.workers, &cx);
            }
        }

        for s in &mut self.supervisors {
            s.supervise(&self.workers, &self.handlers);
        }

        self.ticks += 1;
        self.bus.publish(
            Event::new(EventKind::TickCompleted)
                .with_tick(self.ticks)
                .with_outcome(fresh, handlers_ran),
        );
        TickReport {
            tick: self.ticks,
            now,
            fresh,
            handlers_ran,
        }
    }

    /// Runs ticks every `tick_interval` until `token` is cancelled, then shuts down.
    ///
    /// Ticks run back to back on the calling task; a slow tick delays the next
    /// one and missed ticks are skipped.
    pub async fn run(&mut self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.cfg.tick_interval_clamped());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    self.run_tick();
                }
            }
        }
        self.shutdown();
    }

    /// Cancels every outstanding background operation and deactivates every
    /// worker and handler. Subscribers receive the remaining events and stop.
    pub fn shutdown(&mut self) {
        let ids: Vec<WorkerId> = self.workers.ids().collect();
        for id in ids {
            self.cancel_worker_async(id);
        }
        let ids: Vec<HandlerId> = self.handlers.ids().collect();
        for id in ids {
            self.cancel_handler_async(id);
        }
        self.set_all_active(false);
        self.bus.publish(Event::new(EventKind::ShutdownCompleted));
        self.listener.cancel();
    }

    // === Accessors ===

    /// Registered workers.
    pub fn workers(&self) -> &WorkerMap {
        &self.workers
    }

    /// Registered handlers.
    pub fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }

    /// Number of registered supervisors.
    pub fn supervisor_count(&self) -> usize {
        self.supervisors.len()
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Configuration the aggregator was built with.
    pub fn config(&self) -> &AggregatorConfig {
        &self.cfg
    }

    /// The event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Subscribes to subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.listener.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::sync::oneshot;

    use crate::activation::{Activate, ActivationState};
    use crate::clock::ManualClock;
    use crate::handlers::{HandleContext, HandlerStatus};
    use crate::workers::{WorkContext, WorkerStatus};

    const SENSOR: WorkerId = 5;
    const DOUBLER: WorkerId = 0;
    const SINK: HandlerId = 1;

    /// Plain worker counting its own productions.
    #[derive(Default)]
    struct Sensor {
        refuse_activation: bool,
        activation_calls: Arc<Mutex<Vec<bool>>>,
    }

    impl Activate for Sensor {
        fn activate(&mut self, retry: bool) -> bool {
            self.activation_calls.lock().unwrap().push(retry);
            !self.refuse_activation
        }
    }

    impl Produce for Sensor {
        type Output = u32;
        type Staged = ();

        fn produce(&mut self, cx: &mut WorkContext<'_, u32, ()>) -> WorkerStatus {
            *cx.value_mut() += 1;
            WorkerStatus::Fresh
        }
    }

    /// Dependent worker doubling the sensor's current value.
    #[derive(Default)]
    struct Doubler {
        saw_itself: bool,
    }

    impl Activate for Doubler {}

    impl Process for Doubler {
        type Output = u32;
        type Staged = ();

        fn produce(&mut self, workers: &WorkerMap, cx: &mut WorkContext<'_, u32, ()>) -> WorkerStatus {
            self.saw_itself |= workers.contains(cx.id());
            match workers.worker::<Sensor>(SENSOR) {
                Some(s) if s.is_fresh() => {
                    *cx.value_mut() = *s.value() * 2;
                    WorkerStatus::Fresh
                }
                _ => WorkerStatus::Idle,
            }
        }
    }

    /// Handler counting invocations; optionally offloads to a gated job.
    #[derive(Default)]
    struct Sink {
        calls: Arc<AtomicU32>,
        deactivations: Arc<AtomicU32>,
        gate: Option<oneshot::Receiver<HandlerStatus>>,
    }

    impl Activate for Sink {
        fn deactivate(&mut self) {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Handle for Sink {
        fn handle(&mut self, _workers: &WorkerMap, cx: &mut HandleContext<'_>) -> HandlerStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.gate.take() {
                Some(rx) => cx.start_async("led-blink", async move {
                    rx.await.unwrap_or(HandlerStatus::Error)
                }),
                None => HandlerStatus::DataHandled,
            }
        }
    }

    /// Supervisor recording the sink status seen on every tick.
    struct Watch {
        seen: Arc<Mutex<Vec<HandlerStatus>>>,
        initialized: Arc<AtomicU32>,
    }

    impl Supervise for Watch {
        fn initialize(&mut self) {
            self.initialized.fetch_add(1, Ordering::SeqCst);
        }

        fn supervise(&mut self, _workers: &WorkerMap, handlers: &HandlerMap) {
            let status = handlers.get(SINK).map_or(HandlerStatus::Idle, |h| h.status());
            self.seen.lock().unwrap().push(status);
        }
    }

    fn aggregator(clock: &ManualClock) -> Aggregator {
        Aggregator::builder(AggregatorConfig::default())
            .with_clock(clock.clone())
            .build()
    }

    fn watch(agg: &mut Aggregator) -> Arc<Mutex<Vec<HandlerStatus>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        agg.register_supervisor(Watch {
            seen: seen.clone(),
            initialized: Arc::new(AtomicU32::new(0)),
        });
        seen
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    async fn settle(agg: &Aggregator) {
        for _ in 0..1000 {
            if !agg.has_pending_async() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("background operations did not settle");
    }

    #[test]
    fn test_throttled_worker_triggers_handler_on_same_tick() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        agg.register_worker(SENSOR, Worker::with_break(Sensor::default(), 0, Duration::from_millis(1000)))
            .unwrap();
        agg.register_handler(SINK, Handler::new(Sink { calls: calls.clone(), ..Default::default() }))
            .unwrap();
        agg.set_worker_active(SENSOR, true);

        assert!(agg.run_tick().fresh, "first production ignores the throttle");
        agg.set_handler_active(SINK, true);

        clock.set(Duration::from_millis(500));
        let report = agg.run_tick();
        assert!(!report.fresh);
        assert!(!report.handlers_ran);
        assert_eq!(agg.workers().get(SENSOR).map(|w| w.status()), Some(WorkerStatus::Idle));
        assert_eq!(agg.handlers().get(SINK).map(|h| h.status()), Some(HandlerStatus::Idle));

        clock.set(Duration::from_millis(1000));
        let report = agg.run_tick();
        assert!(report.fresh);
        assert!(report.handlers_ran);
        assert_eq!(agg.workers().get(SENSOR).map(|w| w.status()), Some(WorkerStatus::Fresh));
        assert_eq!(agg.handlers().get(SINK).map(|h| h.status()), Some(HandlerStatus::DataHandled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(agg.workers().worker::<Sensor>(SENSOR).map(|w| *w.value()), Some(2));
    }

    #[test]
    fn test_failing_activation_is_retried_once_per_tick() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&clock);
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let sensor = Sensor {
            refuse_activation: true,
            activation_calls: attempts.clone(),
        };
        agg.register_worker(SENSOR, Worker::new(sensor, 0)).unwrap();
        let seen = watch(&mut agg);
        let mut rx = agg.subscribe();

        agg.activate_all();
        for _ in 0..5 {
            clock.advance(Duration::from_secs(2));
            assert!(!agg.run_tick().fresh);
        }

        assert_eq!(*attempts.lock().unwrap(), vec![false, true, true, true, true, true]);
        let view = agg.workers().get(SENSOR).unwrap();
        assert_eq!(view.active_state(), ActivationState::ActivationFailed);
        assert_eq!(view.activation_failures(), 6);
        assert!(!view.is_fresh());
        assert_eq!(seen.lock().unwrap().len(), 5, "supervisors run on every tick");

        let retries = drain(&mut rx)
            .into_iter()
            .filter(|e| e.kind == EventKind::ActivationFailed && e.retry == Some(true))
            .count();
        assert_eq!(retries, 5);
    }

    #[tokio::test]
    async fn test_async_handler_merges_after_completion() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&clock);
        let (tx, rx) = oneshot::channel();
        let calls = Arc::new(AtomicU32::new(0));
        agg.register_worker(SENSOR, Worker::new(Sensor::default(), 0)).unwrap();
        agg.register_handler(
            SINK,
            Handler::new(Sink { calls: calls.clone(), gate: Some(rx), ..Default::default() }),
        )
        .unwrap();
        let seen = watch(&mut agg);
        agg.activate_all();

        assert!(agg.run_tick().handlers_ran);
        clock.advance(Duration::from_millis(10));
        let report = agg.run_tick();
        assert!(!report.fresh);
        assert!(report.handlers_ran, "pending handler keeps handlers triggered");

        tx.send(HandlerStatus::DataHandled).unwrap();
        settle(&agg).await;
        clock.advance(Duration::from_millis(10));
        agg.run_tick();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![HandlerStatus::Processing, HandlerStatus::Processing, HandlerStatus::DataHandled]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_millis(10));
        assert!(!agg.run_tick().handlers_ran, "nothing fresh and nothing pending");
    }

    #[test]
    fn test_dependent_worker_sees_values_of_same_tick() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&clock);
        agg.register_process_worker(DOUBLER, ProcessWorker::with_break(Doubler::default(), 0, Duration::ZERO))
            .unwrap();
        agg.register_worker(SENSOR, Worker::with_break(Sensor::default(), 0, Duration::ZERO))
            .unwrap();
        agg.activate_all();

        for tick in 1..=3u32 {
            clock.advance(Duration::from_millis(1));
            assert!(agg.run_tick().fresh);
            let sensor = agg.workers().worker::<Sensor>(SENSOR).map(|w| *w.value());
            let doubled = agg.workers().process_worker::<Doubler>(DOUBLER).map(|w| *w.value());
            assert_eq!(sensor, Some(tick));
            assert_eq!(doubled, Some(tick * 2));
        }

        let doubler = agg.workers().process_worker::<Doubler>(DOUBLER).unwrap();
        assert!(!doubler.producer().saw_itself);
        assert_eq!(agg.workers().ids().collect::<Vec<_>>(), vec![DOUBLER, SENSOR]);
    }

    #[test]
    fn test_inactive_components_only_supervisors_run() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        agg.register_worker(SENSOR, Worker::new(Sensor::default(), 0)).unwrap();
        agg.register_handler(SINK, Handler::new(Sink { calls: calls.clone(), ..Default::default() }))
            .unwrap();
        let seen = watch(&mut agg);

        for _ in 0..3 {
            let report = agg.run_tick();
            assert!(!report.fresh);
            assert!(!report.handlers_ran);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert!(!agg.workers().any_updates());
    }

    #[test]
    fn test_duplicate_registration_keeps_original() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&clock);
        let mut rx = agg.subscribe();
        agg.register_worker(SENSOR, Worker::new(Sensor::default(), 0)).unwrap();
        agg.register_handler(SINK, Handler::new(Sink::default())).unwrap();

        assert_eq!(
            agg.register_process_worker(SENSOR, ProcessWorker::new(Doubler::default(), 0)),
            Err(RegisterError::DuplicateWorker { id: SENSOR })
        );
        assert_eq!(
            agg.register_handler(SINK, Handler::new(Sink::default())),
            Err(RegisterError::DuplicateHandler { id: SINK })
        );
        assert_eq!(agg.workers().len(), 1);
        assert!(agg.workers().worker::<Sensor>(SENSOR).is_some());
        assert_eq!(agg.workers().get(SENSOR).map(|w| w.kind()), Some(WorkerKind::Plain));

        agg.activate_all();
        assert!(agg.run_tick().fresh, "original worker still ticks");
        assert_eq!(agg.workers().worker::<Sensor>(SENSOR).map(|w| *w.value()), Some(1));

        let conflicts: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| e.kind == EventKind::RegistrationConflict)
            .map(|e| e.component)
            .collect();
        assert_eq!(conflicts, vec![Some(Component::Worker(SENSOR)), Some(Component::Handler(SINK))]);
    }

    #[test]
    fn test_supervisor_initialized_once_on_registration() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&clock);
        let initialized = Arc::new(AtomicU32::new(0));
        agg.register_supervisor(Watch {
            seen: Arc::new(Mutex::new(Vec::new())),
            initialized: initialized.clone(),
        });
        agg.run_tick();
        agg.run_tick();
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert_eq!(agg.supervisor_count(), 1);
    }

    #[test]
    fn test_deactivated_worker_loses_freshness() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&clock);
        agg.register_worker(SENSOR, Worker::new(Sensor::default(), 0)).unwrap();
        agg.activate_all();
        agg.run_tick();
        assert!(agg.workers().any_fresh());

        assert_eq!(agg.set_worker_active(SENSOR, false), Some(Transition::Deactivated));
        assert!(!agg.workers().any_fresh());
        assert_eq!(agg.workers().worker::<Sensor>(SENSOR).map(|w| *w.value()), Some(1));
        assert_eq!(agg.set_worker_active(42, true), None);
    }

    #[tokio::test]
    async fn test_saturated_executor_reports_start_failure() {
        let clock = ManualClock::new();
        let cfg = AggregatorConfig {
            max_concurrent: 1,
            ..AggregatorConfig::default()
        };
        let mut agg = Aggregator::builder(cfg).with_clock(clock.clone()).build();
        let (_tx1, rx1) = oneshot::channel();
        let (_tx2, rx2) = oneshot::channel();
        agg.register_worker(SENSOR, Worker::new(Sensor::default(), 0)).unwrap();
        agg.register_handler(1, Handler::new(Sink { gate: Some(rx1), ..Default::default() }))
            .unwrap();
        agg.register_handler(2, Handler::new(Sink { gate: Some(rx2), ..Default::default() }))
            .unwrap();
        agg.activate_all();
        let mut rx = agg.subscribe();

        agg.run_tick();
        assert_eq!(agg.handlers().get(1).map(|h| h.status()), Some(HandlerStatus::Processing));
        assert_eq!(agg.handlers().get(2).map(|h| h.status()), Some(HandlerStatus::Error));

        let failed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| e.kind == EventKind::AsyncStartFailed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].component, Some(Component::Handler(2)));
        assert_eq!(failed[0].reason.as_deref(), Some("offload_saturated"));
    }

    /// Handler whose background job never finishes on its own.
    struct Stuck;

    impl Activate for Stuck {}

    impl Handle for Stuck {
        fn handle(&mut self, _workers: &WorkerMap, cx: &mut HandleContext<'_>) -> HandlerStatus {
            cx.start_async("stuck", futures::future::pending::<HandlerStatus>())
        }
    }

    #[tokio::test]
    async fn test_cancelled_job_frees_slot_under_cap() {
        let clock = ManualClock::new();
        let cfg = AggregatorConfig {
            max_concurrent: 1,
            ..AggregatorConfig::default()
        };
        let mut agg = Aggregator::builder(cfg).with_clock(clock.clone()).build();
        agg.register_worker(SENSOR, Worker::new(Sensor::default(), 0)).unwrap();
        agg.register_handler(SINK, Handler::new(Stuck)).unwrap();
        agg.activate_all();

        agg.run_tick();
        assert_eq!(agg.handlers().get(SINK).map(|h| h.status()), Some(HandlerStatus::Processing));
        assert_eq!(agg.cancel_handler_async(SINK).as_deref(), Some("stuck"));

        let mut rx = agg.subscribe();
        clock.advance(Duration::from_secs(1));
        assert!(agg.run_tick().handlers_ran);
        assert_eq!(agg.handlers().get(SINK).map(|h| h.status()), Some(HandlerStatus::Processing));
        assert!(
            drain(&mut rx)
                .iter()
                .all(|e| e.kind != EventKind::AsyncStartFailed)
        );
    }

    #[test]
    fn test_job_dropped_by_runtime_is_reported_aborted() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let clock = ManualClock::new();
        let mut agg = Aggregator::builder(AggregatorConfig::default())
            .with_clock(clock.clone())
            .with_runtime(rt.handle().clone())
            .build();
        agg.register_worker(SENSOR, Worker::new(Sensor::default(), 0)).unwrap();
        agg.register_handler(SINK, Handler::new(Stuck)).unwrap();
        agg.activate_all();
        let mut rx = agg.subscribe();

        agg.run_tick();
        assert_eq!(agg.handlers().get(SINK).map(|h| h.status()), Some(HandlerStatus::Processing));
        drop(rt);

        assert!(agg.run_tick().handlers_ran);
        assert_eq!(agg.handlers().get(SINK).map(|h| h.status()), Some(HandlerStatus::Error));
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| e.kind == EventKind::AsyncAborted));
        assert!(events.iter().all(|e| e.kind != EventKind::AsyncPanicked));
    }

    struct Flaky;

    impl Activate for Flaky {}

    impl Produce for Flaky {
        type Output = u32;
        type Staged = u32;

        fn produce(&mut self, cx: &mut WorkContext<'_, u32, u32>) -> WorkerStatus {
            cx.start_async("flaky-read", async {
                if true {
                    panic!("bus fault");
                }
                (WorkerStatus::Fresh, 0)
            })
        }
    }

    #[tokio::test]
    async fn test_panicking_job_becomes_error_status() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&clock);
        agg.register_worker(SENSOR, Worker::new(Flaky, 7)).unwrap();
        agg.activate_all();
        let mut rx = agg.subscribe();

        agg.run_tick();
        settle(&agg).await;
        assert!(!agg.run_tick().fresh);

        assert_eq!(agg.workers().get(SENSOR).map(|w| w.status()), Some(WorkerStatus::Error));
        assert_eq!(agg.workers().worker::<Flaky>(SENSOR).map(|w| *w.value()), Some(7));
        let panicked = drain(&mut rx)
            .into_iter()
            .find(|e| e.kind == EventKind::AsyncPanicked)
            .expect("panic event");
        assert!(panicked.reason.as_deref().unwrap_or("").contains("bus fault"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_deactivates() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&clock);
        let (_tx, rx) = oneshot::channel();
        let deactivations = Arc::new(AtomicU32::new(0));
        agg.register_worker(SENSOR, Worker::new(Sensor::default(), 0)).unwrap();
        agg.register_handler(
            SINK,
            Handler::new(Sink { gate: Some(rx), deactivations: deactivations.clone(), ..Default::default() }),
        )
        .unwrap();
        agg.activate_all();
        agg.run_tick();
        assert!(agg.has_pending_async());
        let mut events = agg.subscribe();

        agg.shutdown();

        assert!(!agg.has_pending_async());
        assert_eq!(deactivations.load(Ordering::SeqCst), 1);
        let h = agg.handlers().get(SINK).unwrap();
        assert_eq!(h.active_state(), ActivationState::Inactive);
        assert_eq!(h.status(), HandlerStatus::Idle);

        let kinds: Vec<_> = drain(&mut events).into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::AsyncCancelled,
                EventKind::Deactivated,
                EventKind::Deactivated,
                EventKind::ShutdownCompleted,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_ticks_until_cancelled() {
        let cfg = AggregatorConfig {
            tick_interval: Duration::from_millis(10),
            ..AggregatorConfig::default()
        };
        let mut agg = Aggregator::builder(cfg).build();
        agg.register_worker(SENSOR, Worker::with_break(Sensor::default(), 0, Duration::ZERO))
            .unwrap();
        agg.activate_all();

        let token = CancellationToken::new();
        let stop = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(55)).await;
            stop.cancel();
        });
        agg.run(token).await;

        assert!((5..=7).contains(&agg.ticks()), "ticks = {}", agg.ticks());
        let sensor = agg.workers().get(SENSOR).unwrap();
        assert_eq!(sensor.active_state(), ActivationState::Inactive);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        use async_trait::async_trait;

        use crate::subscribers::Subscribe;

        struct Collect(Arc<Mutex<Vec<EventKind>>>);

        #[async_trait]
        impl Subscribe for Collect {
            async fn on_event(&self, ev: &Event) {
                self.0.lock().unwrap().push(ev.kind);
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut agg = Aggregator::builder(AggregatorConfig::default())
            .with_clock(ManualClock::new())
            .with_subscribers(vec![Arc::new(Collect(seen.clone()))])
            .build();
        agg.register_worker(SENSOR, Worker::new(Sensor::default(), 0)).unwrap();
        agg.activate_all();
        agg.run_tick();
        agg.shutdown();

        for _ in 0..1000 {
            if seen.lock().unwrap().contains(&EventKind::ShutdownCompleted) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                EventKind::Registered,
                EventKind::Activated,
                EventKind::TickCompleted,
                EventKind::Deactivated,
                EventKind::ShutdownCompleted,
            ]
        );
    }
}
