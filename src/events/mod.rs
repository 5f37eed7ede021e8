//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: workers, request handles, the `ObserverSet` workers (overflow/panic).
//! - **Consumers**: `Coalescer`'s observer listener, which fans out to the `ObserverSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
