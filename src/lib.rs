//! # coalescer
//!
//! **Coalescer** is a per-key request coalescing library for async Rust.
//!
//! Concurrent requests for the same key share one execution of an expensive
//! producer: the first caller starts a one-shot worker, every later caller joins it,
//! and the single result (value or failure) is fanned out to all of them.
//! Each caller keeps its own deadline and detects a worker that dies without answering.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   caller A          caller B          caller C
//!   request(k)        request(k)        request(k)
//!      │                 │                 │
//!      ▼                 ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Coalescer (one named instance)                                   │
//! │  - KeyTable          key → worker slot, atomic start-or-join      │
//! │  - SubscriptionTable key → {ticket → delivery channel}            │
//! │  - named producers   name → ProducerRef                           │
//! │  - Bus               broadcast of runtime events                  │
//! └──────┬──────────────────────────────────────────┬─────────────────┘
//!        │ Started                                  │ Joined / Cached
//!        ▼                                          ▼
//!  ┌──────────────┐  dispatch(snapshot)   ┌──────────────────┐
//!  │    Worker    │ ────────────────────► │  RequestHandle   │  × N
//!  │ (runs once)  │                       │ (ticket, owner,  │
//!  └──────┬───────┘  exit signal (drop)   │  timeout, watch) │
//!         └─────────────────────────────► └──────────────────┘
//!
//!  Worker / RequestHandle ── publish(Event) ──► Bus ──► observer listener
//!                                                         └─► ObserverSet ─► Observe::on_event
//! ```
//!
//! ### Worker lifecycle
//! ```text
//! request(key) ──► KeyTable::start_or_join ──► Worker::run()
//!
//!   ├─► producer.produce()            (once; panics are caught)
//!   ├─► set terminal value            (visible to late joiners)
//!   ├─► dispatch to subscriber snapshot
//!   ├─► success: linger until the window ends or the first fast-path read
//!   └─► retire: remove own key entry  (failures are never cached)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Coalescing**    | Start-or-join per key, one execution per wave of requests.   | [`Coalescer`], [`CoalescerBuilder`]         |
//! | **Requests**      | Owned handles with timeout, crash detection and linking.     | [`RequestHandle`], [`RequestOptions`]       |
//! | **Producers**     | Shared units of work, as closures or trait objects.          | [`Producer`], [`ProducerFn`], [`ProducerRef`] |
//! | **Observer API**  | Hook into runtime events (logging, metrics, custom).         | [`Observe`], [`ObserverSet`]                |
//! | **Errors**        | Typed errors for callers and captured producer failures.     | [`CoalesceError`], [`ProducerError`]        |
//! | **Configuration** | Default timeout, linger window, bus capacity.                | [`CoalescerConfig`]                         |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], an observer that forwards events to `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use coalescer::{Coalescer, CoalescerConfig, ProducerFn, ProducerRef, RequestOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = CoalescerConfig::default();
//!     cfg.default_timeout = Duration::from_secs(2);
//!
//!     #[cfg(feature = "logging")]
//!     let observers: Vec<Arc<dyn coalescer::Observe>> = vec![Arc::new(coalescer::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let observers: Vec<Arc<dyn coalescer::Observe>> = Vec::new();
//!
//!     let profiles: Coalescer<u64, String> = Coalescer::builder("profiles")
//!         .with_config(cfg)
//!         .with_observers(observers)
//!         .build()?;
//!
//!     let load: ProducerRef<String> = ProducerFn::arc(|| async {
//!         tokio::time::sleep(Duration::from_millis(20)).await;
//!         Ok::<_, std::io::Error>("alice".to_string())
//!     });
//!
//!     let first = profiles.request(1, load.clone(), RequestOptions::default())?;
//!     let second = profiles.request(1, load, RequestOptions::default())?;
//!
//!     assert_eq!(first.wait(None).await?, "alice");
//!     assert_eq!(second.wait(None).await?, "alice");
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod observers;
mod producers;

// ---- Public re-exports ----

pub use core::{
    CallerId, CoalesceKey, CoalesceValue, Coalescer, CoalescerBuilder, CoalescerConfig,
    RequestHandle, RequestOptions, Ticket, WorkerId,
};
pub use error::{CoalesceError, FailureKind, ProducerError};
pub use events::{Bus, Event, EventKind};
pub use observers::{Observe, ObserverSet};
pub use producers::{Producer, ProducerFn, ProducerRef};

// Optional: expose the built-in tracing observer.
// Enabled by default; opt out with `default-features = false`.
#[cfg(feature = "logging")]
pub use observers::LogWriter;
