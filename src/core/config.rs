//! # Aggregator configuration.
//!
//! Provides [`AggregatorConfig`], the settings consumed by
//! [`AggregatorBuilder`](crate::AggregatorBuilder).
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no global semaphore created)
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Configuration for the aggregator.
///
/// ## Field semantics
/// - `tick_interval`: period of [`Aggregator::run`](crate::Aggregator::run)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `max_concurrent`: background operations outstanding at once, across all
///   workers and handlers (`0` = unlimited)
///
/// All fields are public. Prefer the helper accessors to sprinkling sentinel
/// checks across the codebase.
#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    /// Time between two ticks of the run loop.
    ///
    /// A tick that overruns the interval delays the next one; missed ticks are
    /// skipped, never bunched.
    pub tick_interval: Duration,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Slow listeners that lag behind more than `bus_capacity` events skip the
    /// oldest ones.
    pub bus_capacity: usize,

    /// Global cap on outstanding background operations.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = starting the `n+1`-th operation fails with
    ///   [`OffloadError::Saturated`](crate::OffloadError::Saturated)
    pub max_concurrent: usize,
}

impl AggregatorConfig {
    /// Returns the global concurrency limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` outstanding operations
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the tick interval, never zero (`tokio::time::interval` panics on zero).
    #[inline]
    pub fn tick_interval_clamped(&self) -> Duration {
        self.tick_interval.max(Duration::from_millis(1))
    }
}

impl Default for AggregatorConfig {
    /// Default configuration:
    ///
    /// - `tick_interval = 10ms`
    /// - `bus_capacity = 1024`
    /// - `max_concurrent = 0` (unlimited)
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            bus_capacity: 1024,
            max_concurrent: 0,
        }
    }
}
