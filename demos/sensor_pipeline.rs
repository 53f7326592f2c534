//! Sensor pipeline demo.
//!
//! - worker #0 `Counter` bumps a measurement once per second
//! - worker #1 `DelayedEcho` copies it through a slow background step
//! - handler #0 `Led` toggles a simulated LED on odd measurements
//! - handler #1 `SerialOut` writes a line through a blocking background step
//! - supervisor `FailureWatch` warns about components stuck in `ActivationFailed`
//!
//! Run with:
//! ```text
//! RUST_LOG=info cargo run --example sensor_pipeline --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tickvisor::{
    Activate, ActivationState, Aggregator, AggregatorConfig, Handle, HandleContext, Handler,
    HandlerMap, HandlerStatus, LogWriter, Process, ProcessWorker, Produce, Subscribe, Supervise,
    WorkContext, Worker, WorkerMap, WorkerStatus,
};

const COUNTER: u8 = 0;
const ECHO: u8 = 1;
const LED: u8 = 0;
const SERIAL: u8 = 1;

#[derive(Debug, Clone)]
struct Measurement {
    value: i32,
    text: &'static str,
}

struct Counter;

impl Activate for Counter {}

impl Produce for Counter {
    type Output = Measurement;
    type Staged = ();

    fn produce(&mut self, cx: &mut WorkContext<'_, Measurement, ()>) -> WorkerStatus {
        let m = cx.value_mut();
        m.value += 1;
        m.text = if m.value % 5 == 0 { "five" } else { "tick" };
        WorkerStatus::Fresh
    }
}

/// Copies the counter through a background step that takes 1.5s.
struct DelayedEcho;

impl Activate for DelayedEcho {}

impl Process for DelayedEcho {
    type Output = i32;
    type Staged = i32;

    fn produce(&mut self, workers: &WorkerMap, cx: &mut WorkContext<'_, i32, i32>) -> WorkerStatus {
        let Some(counter) = workers.worker::<Counter>(COUNTER).filter(|w| w.is_fresh()) else {
            return WorkerStatus::Idle;
        };
        let value = counter.value().value;
        cx.start_async("echo", async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            (WorkerStatus::Fresh, value)
        })
    }

    fn finish(&mut self, value: &mut i32, staged: i32) {
        *value = staged;
    }
}

#[derive(Default)]
struct Led {
    on: bool,
}

impl Activate for Led {
    fn activate(&mut self, _retry: bool) -> bool {
        self.on = false;
        true
    }
}

impl Handle for Led {
    fn handle(&mut self, workers: &WorkerMap, _cx: &mut HandleContext<'_>) -> HandlerStatus {
        match workers.worker::<Counter>(COUNTER).filter(|w| w.is_fresh()) {
            Some(w) => {
                self.on = w.value().value % 2 != 0;
                tracing::info!(led = if self.on { "on" } else { "off" }, "led");
                HandlerStatus::DataHandled
            }
            None => HandlerStatus::Idle,
        }
    }
}

struct SerialOut;

impl Activate for SerialOut {}

impl Handle for SerialOut {
    fn handle(&mut self, workers: &WorkerMap, cx: &mut HandleContext<'_>) -> HandlerStatus {
        let mut line = String::new();
        if let Some(w) = workers.worker::<Counter>(COUNTER).filter(|w| w.is_fresh()) {
            line.push_str(&format!("counter={} ({}) ", w.value().value, w.value().text));
        }
        if let Some(w) = workers.process_worker::<DelayedEcho>(ECHO).filter(|w| w.is_fresh()) {
            line.push_str(&format!("echo={}", w.value()));
        }
        if line.is_empty() {
            return HandlerStatus::Idle;
        }
        cx.start_blocking("serial-write", move || {
            std::thread::sleep(Duration::from_millis(20));
            println!("{line}");
            HandlerStatus::DataHandled
        })
    }
}

#[derive(Default)]
struct FailureWatch {
    ticks: u64,
}

impl Supervise for FailureWatch {
    fn supervise(&mut self, workers: &WorkerMap, handlers: &HandlerMap) {
        self.ticks += 1;
        if self.ticks % 500 == 0 {
            tracing::info!(ticks = self.ticks, "failure-watch heartbeat");
        }
        for (id, w) in workers.iter() {
            if w.active_state() == ActivationState::ActivationFailed && w.activation_failures() % 100 == 0 {
                tracing::warn!(worker = id, failures = w.activation_failures(), "worker stuck");
            }
        }
        for (id, h) in handlers.iter() {
            if h.active_state() == ActivationState::ActivationFailed && h.activation_failures() % 100 == 0 {
                tracing::warn!(handler = id, failures = h.activation_failures(), "handler stuck");
            }
        }
    }

    fn name(&self) -> &'static str {
        "failure-watch"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let mut agg = Aggregator::builder(AggregatorConfig::default())
        .with_subscribers(subs)
        .build();

    let initial = Measurement { value: 0, text: "tick" };
    agg.register_worker(COUNTER, Worker::new(Counter, initial))?;
    agg.register_process_worker(ECHO, ProcessWorker::with_break(DelayedEcho, 0, Duration::ZERO))?;
    agg.register_handler(LED, Handler::new(Led::default()))?;
    agg.register_handler(SERIAL, Handler::new(SerialOut))?;
    agg.register_supervisor(FailureWatch::default());
    agg.activate_all();

    let token = CancellationToken::new();
    let stop = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = tokio::time::sleep(Duration::from_secs(10)) => {}
        }
        stop.cancel();
    });
    agg.run(token).await;

    // Let the subscriber workers flush the final events.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
