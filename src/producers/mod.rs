//! # Producer abstractions.
//!
//! - [`Producer`] - trait for the shared unit of work
//! - [`ProducerFn`] - closure-backed implementation
//! - [`ProducerRef`] - shared reference (`Arc<dyn Producer<V>>`)

mod producer;
mod producer_fn;

pub use producer::{Producer, ProducerRef};
pub use producer_fn::ProducerFn;
