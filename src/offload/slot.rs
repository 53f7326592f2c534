//! # Single-flight offload slot.
//!
//! [`Offload`] holds at most one outstanding background operation for the
//! component that owns it.
//!
//! ## Lifecycle
//! ```text
//!   idle ── start() ──► running ── job returns ──► completed ── take_completed() ──► idle
//!             │            │                                                         ▲
//!             │            └──────────────── cancel() ───────────────────────────────┘
//!             └─ Err(OffloadError): stays idle
//! ```
//!
//! ## Rules
//! - A second `start` while an operation is outstanding (running **or** completed
//!   but not yet taken) is a no-op.
//! - The job is `'static` and owns its inputs: it cannot borrow the component's
//!   value. Its result lands in a staging cell and is only handed back to the
//!   main tick through [`Offload::take_completed`].
//! - `cancel` aborts the job, releases its concurrency permit and clears the
//!   in-flight marker before returning; a blocking job that already started runs
//!   to completion but its result is discarded.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::executor::{Completion, Executor, HeldPermit, Spawned, Staging, lock};
use crate::error::OffloadError;

struct InFlight<R> {
    label: Arc<str>,
    staging: Staging<R>,
    permit: HeldPermit,
    join: JoinHandle<()>,
}

impl<R> InFlight<R> {
    fn release(self) -> Arc<str> {
        self.join.abort();
        lock(&self.permit).take();
        self.label
    }
}

/// Outcome of [`Offload::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Started {
    /// The operation was accepted.
    New,
    /// Another operation is still outstanding; nothing was started.
    AlreadyRunning,
}

/// At most one outstanding background operation producing `R`.
pub struct Offload<R> {
    flight: Option<InFlight<R>>,
}

impl<R> Default for Offload<R> {
    fn default() -> Self {
        Self { flight: None }
    }
}

impl<R: Send + 'static> Offload<R> {
    /// Creates an idle slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the operation has not produced its completion yet.
    pub fn is_running(&self) -> bool {
        match &self.flight {
            Some(f) => lock(&f.staging).is_none() && !f.join.is_finished(),
            None => false,
        }
    }

    /// True if an operation was started and not yet taken or cancelled.
    pub fn is_outstanding(&self) -> bool {
        self.flight.is_some()
    }

    /// Label of the outstanding operation.
    pub fn label(&self) -> Option<&str> {
        self.flight.as_ref().map(|f| f.label.as_ref())
    }

    /// Starts `fut` on `executor` unless an operation is outstanding.
    pub fn start<F>(
        &mut self,
        executor: &Executor,
        label: impl Into<Arc<str>>,
        fut: F,
    ) -> Result<Started, OffloadError>
    where
        F: Future<Output = R> + Send + 'static,
    {
        if self.flight.is_some() {
            return Ok(Started::AlreadyRunning);
        }
        let spawned = executor.spawn(fut)?;
        self.arm(label.into(), spawned);
        Ok(Started::New)
    }

    /// Starts the blocking closure `f` on `executor` unless an operation is outstanding.
    pub fn start_blocking<F>(
        &mut self,
        executor: &Executor,
        label: impl Into<Arc<str>>,
        f: F,
    ) -> Result<Started, OffloadError>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        if self.flight.is_some() {
            return Ok(Started::AlreadyRunning);
        }
        let spawned = executor.spawn_blocking(f)?;
        self.arm(label.into(), spawned);
        Ok(Started::New)
    }

    /// Takes the completion of a finished operation, freeing the slot.
    ///
    /// Returns `None` while the operation is still running or if none is outstanding.
    pub fn take_completed(&mut self) -> Option<(Arc<str>, Completion<R>)> {
        let flight = self.flight.as_ref()?;
        let done = lock(&flight.staging).take();
        let done = match done {
            Some(done) => done,
            None if flight.join.is_finished() => Completion::Aborted,
            None => return None,
        };
        let flight = self.flight.take()?;
        Some((flight.release(), done))
    }

    /// Cancels the outstanding operation, if any, and returns its label.
    ///
    /// Safe to call at any time; the slot is idle when this returns.
    pub fn cancel(&mut self) -> Option<Arc<str>> {
        self.flight.take().map(InFlight::release)
    }

    fn arm(&mut self, label: Arc<str>, spawned: Spawned<R>) {
        self.flight = Some(InFlight {
            label,
            staging: spawned.staging,
            permit: spawned.permit,
            join: spawned.join,
        });
    }
}

impl<R> Drop for Offload<R> {
    fn drop(&mut self) {
        if let Some(f) = self.flight.take() {
            f.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn settle<R: Send + 'static>(slot: &Offload<R>) {
        for _ in 0..1000 {
            if !slot.is_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("background operation did not settle");
    }

    #[tokio::test]
    async fn test_single_flight_and_merge() {
        let exec = Executor::current();
        let mut slot: Offload<u32> = Offload::new();
        let (tx, rx) = oneshot::channel::<u32>();

        let started = slot.start(&exec, "job", async move { rx.await.unwrap_or(0) });
        assert_eq!(started, Ok(Started::New));
        assert!(slot.is_running());

        let second = slot.start(&exec, "other", async { 99 });
        assert_eq!(second, Ok(Started::AlreadyRunning));
        assert_eq!(slot.label(), Some("job"));
        assert!(slot.take_completed().is_none());

        tx.send(7).unwrap();
        settle(&slot).await;

        let (label, done) = slot.take_completed().expect("completed");
        assert_eq!(&*label, "job");
        assert_eq!(done, Completion::Finished(7));
        assert!(!slot.is_outstanding());
    }

    #[tokio::test]
    async fn test_cancel_clears_marker() {
        let exec = Executor::current();
        let mut slot: Offload<()> = Offload::new();
        slot.start(&exec, "forever", futures::future::pending::<()>())
            .unwrap();

        assert_eq!(slot.cancel().as_deref(), Some("forever"));
        assert!(!slot.is_running());
        assert!(!slot.is_outstanding());
        assert!(slot.cancel().is_none());
        assert_eq!(slot.start(&exec, "next", async {}), Ok(Started::New));
    }

    #[tokio::test]
    async fn test_panic_becomes_completion() {
        let exec = Executor::current();
        let mut slot: Offload<u8> = Offload::new();
        slot.start(&exec, "boom", async { panic!("sensor fell off") })
            .unwrap();
        settle(&slot).await;

        match slot.take_completed() {
            Some((_, Completion::Panicked(msg))) => assert!(msg.contains("sensor fell off")),
            other => panic!("unexpected completion: {:?}", other.map(|(_, c)| c)),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_job() {
        let exec = Executor::current();
        let mut slot: Offload<u64> = Offload::new();
        slot.start_blocking(&exec, "sum", || (1..=10u64).sum())
            .unwrap();
        settle(&slot).await;

        let (_, done) = slot.take_completed().expect("completed");
        assert_eq!(done, Completion::Finished(55));
    }

    #[tokio::test]
    async fn test_saturated_executor_rejects_without_marking() {
        let exec = Executor::new(None, Some(1));
        let mut a: Offload<()> = Offload::new();
        let mut b: Offload<()> = Offload::new();

        a.start(&exec, "a", futures::future::pending::<()>()).unwrap();
        assert_eq!(exec.available(), Some(0));
        assert_eq!(
            b.start(&exec, "b", async {}),
            Err(OffloadError::Saturated { limit: 1 })
        );
        assert!(!b.is_outstanding());

        a.cancel();
        assert_eq!(exec.available(), Some(1));
        assert_eq!(b.start(&exec, "b", async {}), Ok(Started::New));
    }

    #[tokio::test]
    async fn test_restart_right_after_cancel_under_cap() {
        let exec = Executor::new(None, Some(1));
        let mut slot: Offload<()> = Offload::new();

        slot.start(&exec, "a1", futures::future::pending::<()>()).unwrap();
        assert_eq!(slot.cancel().as_deref(), Some("a1"));
        assert_eq!(slot.start(&exec, "a2", async {}), Ok(Started::New));
        settle(&slot).await;
        assert!(slot.take_completed().is_some());
        assert_eq!(exec.available(), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_blocking_job_frees_permit() {
        let exec = Executor::new(None, Some(1));
        let mut slot: Offload<()> = Offload::new();
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        slot.start_blocking(&exec, "slow", move || {
            let _ = rx.recv();
        })
        .unwrap();
        slot.cancel();
        assert_eq!(exec.available(), Some(1));
        assert_eq!(slot.start(&exec, "next", async {}), Ok(Started::New));
        drop(tx);
    }

    #[tokio::test]
    async fn test_completion_frees_permit_before_take() {
        let exec = Executor::new(None, Some(1));
        let mut slot: Offload<u8> = Offload::new();
        slot.start(&exec, "quick", async { 3 }).unwrap();
        settle(&slot).await;

        assert_eq!(exec.available(), Some(1));
        assert!(slot.take_completed().is_some());
    }

    #[test]
    fn test_no_runtime_fails_to_start() {
        let exec = Executor::current();
        let mut slot: Offload<()> = Offload::new();
        assert_eq!(slot.start(&exec, "x", async {}), Err(OffloadError::NoRuntime));
        assert!(!slot.is_running());
    }
}
