//! # Runtime events emitted by workers, request handles and observers.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Worker events**: producer run lifecycle (started, succeeded, failed, dispatched, retired)
//! - **Caller events**: how a request was served (joined, fast path, timed out, crash detected)
//! - **Observer events**: problems inside the observer fan-out itself
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the rendered key,
//! worker id, ticket and subscriber counts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! There is no ordering between the events of different keys beyond `seq`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use coalescer::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::WorkerFailed)
//!     .with_key("\"user:42\"")
//!     .with_reason("boom")
//!     .with_elapsed(Duration::from_millis(12));
//!
//! assert_eq!(ev.kind, EventKind::WorkerFailed);
//! assert_eq!(ev.key.as_deref(), Some("\"user:42\""));
//! assert_eq!(ev.elapsed_ms, Some(12));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::{Ticket, WorkerId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Worker events ===
    /// A fresh worker was spawned for a key.
    ///
    /// Sets: `key`, `worker`, `ticket` (the request that started it)
    WorkerStarted,

    /// The producer returned a value.
    ///
    /// Sets: `key`, `worker`, `elapsed_ms`
    WorkerSucceeded,

    /// The producer returned an error or panicked.
    ///
    /// Sets: `key`, `worker`, `elapsed_ms`, `reason`
    WorkerFailed,

    /// The terminal value was delivered to the subscriber snapshot.
    ///
    /// Sets: `key`, `worker`, `subscribers` (number of deliveries)
    ResultDispatched,

    /// The worker removed its key table entry and stopped.
    ///
    /// Sets: `key`, `worker`
    WorkerRetired,

    /// The worker was killed externally via [`Coalescer::abort`](crate::Coalescer::abort)
    /// or by a linked caller.
    ///
    /// Sets: `key`, `worker`, `reason`
    WorkerAborted,

    // === Caller events ===
    /// A request joined an already running worker.
    ///
    /// Sets: `key`, `worker`, `ticket`
    RequestJoined,

    /// A request was answered from a cached terminal value.
    ///
    /// Sets: `key`, `worker`, `ticket`
    FastPathHit,

    /// A wait gave up before a delivery arrived (the worker keeps running).
    ///
    /// Sets: `key`, `worker`, `ticket`, `elapsed_ms` (the timeout)
    AwaitTimedOut,

    /// A wait observed the worker vanish without a delivery.
    ///
    /// Sets: `key`, `worker`, `ticket`
    CrashDetected,

    // === Observer events ===
    /// Observer panicked during event processing.
    ///
    /// Sets: `key` (observer name), `reason` (panic info)
    ObserverPanicked,

    /// Observer dropped an event (queue full or worker closed).
    ///
    /// Sets: `key` (observer name), `reason` ("full" or "closed")
    ObserverOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the coalescer instance that emitted the event.
    pub instance: Option<Arc<str>>,
    /// Rendered (`Debug`) key, or observer name for observer events.
    pub key: Option<Arc<str>>,
    /// Worker involved, if any.
    pub worker: Option<WorkerId>,
    /// Request ticket involved, if any.
    pub ticket: Option<Ticket>,
    /// Number of subscribers reached by a dispatch.
    pub subscribers: Option<u32>,
    /// Duration in milliseconds (producer runtime or await timeout).
    pub elapsed_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            instance: None,
            key: None,
            worker: None,
            ticket: None,
            subscribers: None,
            elapsed_ms: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_instance(mut self, instance: impl Into<Arc<str>>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[inline]
    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    #[inline]
    pub fn with_ticket(mut self, ticket: Ticket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    /// Attaches a subscriber count (saturates at `u32::MAX`).
    #[inline]
    pub fn with_subscribers(mut self, n: usize) -> Self {
        self.subscribers = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    /// Attaches a duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.elapsed_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates an observer overflow event.
    #[inline]
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::ObserverOverflow)
            .with_key(observer)
            .with_reason(reason)
    }

    /// Creates an observer panic event.
    #[inline]
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        Event::new(EventKind::ObserverPanicked)
            .with_key(observer)
            .with_reason(info)
    }

    #[inline]
    pub fn is_observer_overflow(&self) -> bool {
        matches!(self.kind, EventKind::ObserverOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::WorkerStarted);
        let b = Event::new(EventKind::WorkerRetired);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn elapsed_is_clamped_to_u32() {
        let ev = Event::new(EventKind::AwaitTimedOut).with_elapsed(Duration::from_secs(u64::MAX));
        assert_eq!(ev.elapsed_ms, Some(u32::MAX));
    }

    #[test]
    fn overflow_helper_sets_observer_name() {
        let ev = Event::observer_overflow("metrics", "full");
        assert!(ev.is_observer_overflow());
        assert_eq!(ev.key.as_deref(), Some("metrics"));
        assert_eq!(ev.reason.as_deref(), Some("full"));
    }
}
