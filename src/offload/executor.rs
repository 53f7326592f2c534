//! # Background execution facility.
//!
//! [`Executor`] starts units of work on a tokio runtime, off the tick loop.
//! It is shared by every worker and handler of one aggregator.
//!
//! ## Rules
//! - The runtime is the one passed to the builder, or the one running on the
//!   calling thread; without either, starting fails with [`OffloadError::NoRuntime`].
//! - With `max_concurrent > 0` every operation holds a semaphore permit until it
//!   completes or is cancelled; when none is free, starting fails with
//!   [`OffloadError::Saturated`] instead of waiting (the tick never blocks).
//! - The permit is shared between the job and its slot: whichever side finishes
//!   first (completion or cancel) releases it, so a cancelled slot can restart
//!   immediately.
//! - The unit of work is wrapped so that a panic is caught and stored as the
//!   operation's completion; the completion is the only state the wrapper writes.

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::error::OffloadError;

/// How a background operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<R> {
    /// The operation returned a result.
    Finished(R),
    /// The operation panicked; carries the panic message.
    Panicked(String),
    /// The runtime dropped the operation before it could finish.
    Aborted,
}

/// Staging cell written once by the completion wrapper, read by the tick loop.
pub(crate) type Staging<R> = Arc<Mutex<Option<Completion<R>>>>;

/// Concurrency permit shared by a job and its slot; taken by whoever ends first.
pub(crate) type HeldPermit = Arc<Mutex<Option<OwnedSemaphorePermit>>>;

/// A spawned operation: its staging cell, permit and join handle.
pub(crate) struct Spawned<R> {
    pub staging: Staging<R>,
    pub permit: HeldPermit,
    pub join: JoinHandle<()>,
}

/// Starts background operations on a tokio runtime.
#[derive(Clone, Debug, Default)]
pub struct Executor {
    handle: Option<Handle>,
    permits: Option<Arc<Semaphore>>,
    limit: usize,
}

impl Executor {
    /// Creates an executor.
    ///
    /// - `handle`: runtime to spawn on (`None` = the runtime of the calling thread)
    /// - `limit`: outstanding operations cap (`None` = unlimited)
    pub fn new(handle: Option<Handle>, limit: Option<usize>) -> Self {
        let limit = limit.filter(|&n| n > 0);
        Self {
            handle,
            permits: limit.map(|n| Arc::new(Semaphore::new(n))),
            limit: limit.unwrap_or(0),
        }
    }

    /// Executor bound to whichever runtime is current when work is started.
    pub fn current() -> Self {
        Self::default()
    }

    /// Number of operations that can still be started (`None` = unlimited).
    pub fn available(&self) -> Option<usize> {
        self.permits.as_ref().map(|s| s.available_permits())
    }

    pub(crate) fn spawn<F, R>(&self, fut: F) -> Result<Spawned<R>, OffloadError>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let handle = self.runtime()?;
        let permit = self.permit()?;
        let staging: Staging<R> = Arc::new(Mutex::new(None));
        let out = Arc::clone(&staging);

        let held: HeldPermit = Arc::new(Mutex::new(permit));
        let release = Arc::clone(&held);

        let join = handle.spawn(async move {
            let done = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(r) => Completion::Finished(r),
                Err(p) => Completion::Panicked(panic_message(p.as_ref())),
            };
            *lock(&out) = Some(done);
            lock(&release).take();
        });
        Ok(Spawned {
            staging,
            permit: held,
            join,
        })
    }

    pub(crate) fn spawn_blocking<F, R>(&self, f: F) -> Result<Spawned<R>, OffloadError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let handle = self.runtime()?;
        let permit = self.permit()?;
        let staging: Staging<R> = Arc::new(Mutex::new(None));
        let out = Arc::clone(&staging);

        let held: HeldPermit = Arc::new(Mutex::new(permit));
        let release = Arc::clone(&held);

        let join = handle.spawn_blocking(move || {
            let done = match catch_unwind(AssertUnwindSafe(f)) {
                Ok(r) => Completion::Finished(r),
                Err(p) => Completion::Panicked(panic_message(p.as_ref())),
            };
            *lock(&out) = Some(done);
            lock(&release).take();
        });
        Ok(Spawned {
            staging,
            permit: held,
            join,
        })
    }

    fn runtime(&self) -> Result<Handle, OffloadError> {
        match &self.handle {
            Some(h) => Ok(h.clone()),
            None => Handle::try_current().map_err(|_| OffloadError::NoRuntime),
        }
    }

    fn permit(&self) -> Result<Option<OwnedSemaphorePermit>, OffloadError> {
        match &self.permits {
            None => Ok(None),
            Some(sem) => Arc::clone(sem)
                .try_acquire_owned()
                .map(Some)
                .map_err(|_| OffloadError::Saturated { limit: self.limit }),
        }
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(p: &(dyn Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
