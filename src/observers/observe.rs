//! # Event observer trait.
//!
//! Provides [`Observe`] an extension point for plugging custom event handlers into a coalescer.
//!
//! Each observer gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-observer bounded queue** (capacity via [`Observe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `EventKind::ObserverPanicked`)
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use coalescer::{Event, EventKind, Observe};
//!
//! struct Metrics;
//!
//! #[async_trait]
//! impl Observe for Metrics {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::WorkerFailed) {
//!             // export a metric, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "metrics" }
//!     fn queue_capacity(&self) -> usize { 2048 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event observer for coalescer observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this observer's queue.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Processes a single event. Events arrive in FIFO order per observer.
    async fn on_event(&self, event: &Event);

    /// Returns the observer name used in overflow/panic events.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this observer (clamped to a minimum of 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
