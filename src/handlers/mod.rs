//! # Handlers: consumers of fresh worker data.
//!
//! A handler is triggered by the aggregator whenever some worker was fresh in
//! the current tick, or whenever any handler still has a background operation
//! pending. It has no throttle of its own.
//!
//! - [`Handle`] the user contract
//! - [`Handler`] the driver (activation, status, offload slot)
//! - [`HandlerMap`] the registry handed to supervisors

mod handle;
mod handler;
mod map;
mod status;

pub use handle::{Handle, HandleContext};
pub use handler::Handler;
pub use map::{HandlerMap, HandlerView};
pub use status::HandlerStatus;

/// Registry key of a handler.
pub type HandlerId = u8;
