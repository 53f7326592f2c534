//! # tickvisor
//!
//! **Tickvisor** is a cooperative, tick-driven orchestration core for small
//! controllers: it polls a set of data **workers** (producers), routes freshly
//! produced data to **handlers** (consumers), and lets read-only
//! **supervisors** inspect the outcome of every tick.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐
//!  │  Worker<P>   │  │  Worker<P>   │  │  ProcessWorker<P>  │   (Produce / Process)
//!  │  #1 sensor   │  │  #2 serial   │  │  #3 derived value  │
//!  └──────┬───────┘  └──────┬───────┘  └─────────┬──────────┘
//!         ▼                 ▼                    ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │  Aggregator                                                    │
//! │  - WorkerMap / HandlerMap / supervisors (fixed after setup)    │
//! │  - Clock (one reading per tick)                                │
//! │  - Executor (tokio runtime + optional concurrency cap)         │
//! │  - Bus (broadcast events)                                      │
//! └──────┬───────────────────────┬───────────────────────┬─────────┘
//!        ▼                       ▼                       ▼
//!  ┌──────────────┐      ┌──────────────┐        ┌──────────────┐
//!  │  Handler<H>  │      │  Handler<H>  │        │  Supervise   │
//!  │  #1 led      │      │  #2 serial   │        │  (every tick)│
//!  └──────────────┘      └──────────────┘        └──────────────┘
//!
//!  Bus ──► subscriber_listener ──► SubscriberSet ──► sub.on_event()
//! ```
//!
//! ### Lifecycle
//! ```text
//! register_* ──► set_*_active / activate_all ──► run(token) │ run_tick() ...
//!
//! run_tick {
//!   ├─► plain workers         (throttled; may offload → Processing)
//!   ├─► dependent workers     (read this tick's values)
//!   ├─► handlers              (only if fresh data or a handler is Processing)
//!   ├─► supervisors           (always)
//!   └─► publish TickCompleted
//! }
//!
//! token cancelled ──► shutdown(): cancel offloads, deactivate all, ShutdownCompleted
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                               |
//! |-------------------|-----------------------------------------------------------------|--------------------------------------------------|
//! | **Activation**    | Inactive / Active / ActivationFailed lifecycle with retries.    | [`Activate`], [`Activation`]                     |
//! | **Workers**       | Throttled typed production, optional dependency on siblings.    | [`Produce`], [`Process`], [`Worker`], [`ProcessWorker`] |
//! | **Handlers**      | React to fresh data.                                            | [`Handle`], [`Handler`]                          |
//! | **Supervisors**   | Read-only inspection after each tick.                           | [`Supervise`]                                    |
//! | **Offload**       | Single-flight background steps on tokio.                        | [`WorkContext::start_async`], [`HandleContext::start_async`] |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, alarms).          | [`Subscribe`], [`Event`]                         |
//! | **Errors**        | Typed errors for wiring and offload.                            | [`RegisterError`], [`OffloadError`]              |
//! | **Configuration** | Centralize aggregator settings.                                 | [`AggregatorConfig`]                             |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] that renders events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use tickvisor::{
//!     Activate, Aggregator, AggregatorConfig, HandlerMap, Produce, Supervise, WorkContext,
//!     Worker, WorkerMap, WorkerStatus,
//! };
//!
//! struct Uptime;
//! impl Activate for Uptime {}
//! impl Produce for Uptime {
//!     type Output = Duration;
//!     type Staged = ();
//!     fn produce(&mut self, cx: &mut WorkContext<'_, Duration, ()>) -> WorkerStatus {
//!         *cx.value_mut() = cx.now();
//!         WorkerStatus::Fresh
//!     }
//! }
//!
//! struct Report;
//! impl Supervise for Report {
//!     fn supervise(&mut self, workers: &WorkerMap, _handlers: &HandlerMap) {
//!         if let Some(w) = workers.worker::<Uptime>(1).filter(|w| w.is_fresh()) {
//!             println!("uptime {:?}", w.value());
//!         }
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = AggregatorConfig {
//!         tick_interval: Duration::from_millis(5),
//!         ..AggregatorConfig::default()
//!     };
//!     let mut agg = Aggregator::builder(cfg).build();
//!     agg.register_worker(1, Worker::with_break(Uptime, Duration::ZERO, Duration::from_millis(10)))?;
//!     agg.register_supervisor(Report);
//!     agg.activate_all();
//!
//!     let token = CancellationToken::new();
//!     let stop = token.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(30)).await;
//!         stop.cancel();
//!     });
//!     agg.run(token).await;
//!     Ok(())
//! }
//! ```
mod activation;
mod clock;
mod core;
mod error;
mod events;
mod handlers;
mod offload;
mod subscribers;
mod supervisors;
mod workers;

// ---- Public re-exports ----

pub use activation::{Activate, Activation, ActivationState, Transition};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use core::{Aggregator, AggregatorBuilder, AggregatorConfig, TickReport};
pub use error::{OffloadError, RegisterError};
pub use events::{Bus, Component, Event, EventKind};
pub use handlers::{Handle, HandleContext, Handler, HandlerId, HandlerMap, HandlerStatus, HandlerView};
pub use offload::{Completion, Executor, Offload, Started};
pub use subscribers::{Subscribe, SubscriberSet};
pub use supervisors::Supervise;
pub use workers::{
    DEFAULT_BREAK, Process, ProcessWorker, Produce, StagedResult, WorkContext, Worker, WorkerId,
    WorkerKind, WorkerMap, WorkerStatus, WorkerView,
};

// Optional: expose a built-in `tracing` subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
