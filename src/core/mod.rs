//! Orchestration core.
//!
//! The only public API from this module is [`Aggregator`] (with its
//! [`AggregatorBuilder`] and [`AggregatorConfig`]), which owns the registries
//! and drives ticks.
//!
//! Internal modules:
//! - [`aggregator`]: registries, per-tick algorithm, run loop, shutdown;
//! - [`builder`]: wiring of bus, executor, clock and subscriber listener;
//! - [`context`]: the per-tick environment handed to components.

mod aggregator;
mod builder;
mod config;
mod context;

pub use aggregator::{Aggregator, TickReport};
pub use builder::AggregatorBuilder;
pub use config::AggregatorConfig;

pub(crate) use context::TickContext;
