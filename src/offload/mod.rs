//! Async offload: background execution with single-outstanding-operation discipline.
//!
//! ## Contents
//! - [`Executor`] starts units of work on a tokio runtime (optionally capped)
//! - [`Offload`] one component's single-flight slot
//! - [`Completion`] how a background operation ended
//!
//! ## Single-writer rule
//! ```text
//!   main tick ── start(job) ──► Executor ──► [runtime task] job.await
//!                                                  │
//!                                          completion wrapper
//!                                                  │ writes
//!                                                  ▼
//!                                          staging cell (private)
//!                                                  │
//!   main tick ◄── take_completed() ────────────────┘
//!       └─► merge into owned value/status (main tick only)
//! ```
//! The owned value of a worker lives outside the job's reach: a job is
//! `'static`, so it can only move in copies of what it needs and hand back a
//! separate staged result type.

mod executor;
mod slot;

pub use executor::{Completion, Executor};
pub use slot::{Offload, Started};
