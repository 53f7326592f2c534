//! # Event subscribers.
//!
//! ```text
//!   Aggregator ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                              │
//!                                             ┌────────────────┼────────────┐
//!                                             ▼                ▼            ▼
//!                                         LogWriter        Metrics       Custom
//! ```
//!
//! The listener is spawned by `AggregatorBuilder::build` when subscribers are
//! configured; the tick loop never awaits a subscriber.

mod set;
mod subscriber;

#[cfg(feature = "logging")]
mod embedded;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
