use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{Clock, MonotonicClock},
    core::{Aggregator, AggregatorConfig},
    events::{Bus, Event},
    offload::Executor,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing an [`Aggregator`].
///
/// ```
/// use std::time::Duration;
/// use tickvisor::{Aggregator, AggregatorConfig, ManualClock};
///
/// let cfg = AggregatorConfig {
///     tick_interval: Duration::from_millis(50),
///     ..AggregatorConfig::default()
/// };
/// let agg = Aggregator::builder(cfg)
///     .with_clock(ManualClock::new())
///     .build();
/// assert_eq!(agg.workers().len(), 0);
/// ```
pub struct AggregatorBuilder {
    cfg: AggregatorConfig,
    clock: Option<Arc<dyn Clock>>,
    runtime: Option<Handle>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl AggregatorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: AggregatorConfig) -> Self {
        Self {
            cfg,
            clock: None,
            runtime: None,
            subscribers: Vec::new(),
        }
    }

    /// Sets the time source used for throttling (default: [`MonotonicClock`]).
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Sets the tokio runtime that runs background operations and subscribers.
    ///
    /// Without it, the runtime of the thread calling `build`/`run_tick` is used.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive aggregator events through dedicated workers with
    /// bounded queues. They need a tokio runtime at `build` time.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the aggregator.
    ///
    /// Initializes the event bus, the background executor and, if subscribers
    /// were given, a listener task that fans bus events out to them.
    pub fn build(self) -> Aggregator {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let executor = Executor::new(self.runtime.clone(), self.cfg.concurrency_limit());
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let listener = CancellationToken::new();

        if !self.subscribers.is_empty() {
            match self.runtime.or_else(|| Handle::try_current().ok()) {
                Some(rt) => {
                    let set = SubscriberSet::new(self.subscribers, bus.clone(), &rt);
                    rt.spawn(subscriber_listener(bus.subscribe(), set, listener.clone()));
                }
                None => {
                    tracing::warn!(
                        subscribers = self.subscribers.len(),
                        "no tokio runtime available; event subscribers disabled"
                    );
                }
            }
        }

        Aggregator::new_internal(self.cfg, bus, executor, clock, listener)
    }
}

/// Forwards bus events to the subscriber set until `stop` fires, then drains
/// what is already queued and closes the subscribers.
///
/// The receiver is created in `build`, so events published before the task
/// first runs are not lost.
async fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    set: SubscriberSet,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            res = rx.recv() => match res {
                Ok(ev) => set.emit(ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged behind the event bus");
                }
                Err(RecvError::Closed) => break,
            },
            _ = stop.cancelled() => {
                loop {
                    match rx.try_recv() {
                        Ok(ev) => set.emit(ev),
                        Err(TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }
                break;
            }
        }
    }
    set.shutdown().await;
}
