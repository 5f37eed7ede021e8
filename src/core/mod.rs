//! Coalescing engine.
//!
//! The only public API from this module is [`Coalescer`] (with its builder and config)
//! and [`RequestHandle`]. Internal modules:
//! - [`key_table`]: atomic start-or-join over a sharded key → worker slot map;
//! - [`worker`]: one-shot producer run, dispatch and retirement;
//! - [`subscriptions`]: key → ticketed delivery channels, snapshot dispatch;
//! - [`handle`]: request handle and the ownership/timeout/crash-aware await;
//! - [`coalescer`]: the instance and its request entry points.

mod builder;
mod coalescer;
mod config;
mod handle;
mod ids;
mod key_table;
mod subscriptions;
mod worker;

use std::fmt::Debug;
use std::hash::Hash;

pub use builder::CoalescerBuilder;
pub use coalescer::Coalescer;
pub use config::CoalescerConfig;
pub use handle::{RequestHandle, RequestOptions};
pub use ids::{CallerId, Ticket, WorkerId};

/// Bounds on coalescing keys. `Debug` renders the key into events and errors.
pub trait CoalesceKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> CoalesceKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Bounds on produced values. Each subscriber receives its own clone.
pub trait CoalesceValue: Clone + Send + Sync + 'static {}

impl<T> CoalesceValue for T where T: Clone + Send + Sync + 'static {}
