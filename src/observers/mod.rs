//! # Event observers for the coalescer.
//!
//! This module provides the [`Observe`] trait and built-in implementations
//! for handling runtime events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Worker / RequestHandle ── publish(Event) ──► Bus ──► observer_listener
//!                                                           │
//!                                                     ObserverSet::emit
//!                                                   ┌───────┼────────┐
//!                                                   ▼       ▼        ▼
//!                                               LogWriter Metrics  Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod observe;
mod set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use observe::Observe;
pub use set::ObserverSet;
