//! # LogWriter: tracing-backed event writer
//!
//! A minimal observer that forwards every [`Event`] to `tracing` under the
//! `coalescer` target. Install any `tracing` subscriber to see the output.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO coalescer: worker started key="user:42" worker=w1 ticket=t1
//! INFO coalescer: request joined key="user:42" worker=w1 ticket=t2
//! INFO coalescer: worker succeeded key="user:42" worker=w1 elapsed_ms=503
//! INFO coalescer: result dispatched key="user:42" worker=w1 subscribers=2
//! WARN coalescer: await timed out key="user:42" worker=w1 ticket=t3 elapsed_ms=1
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::observers::Observe;

/// Event writer observer.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let key = e.key.as_deref().unwrap_or("-");
        let instance = e.instance.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::WorkerStarted => {
                tracing::info!(target: "coalescer", instance, key, worker = ?e.worker, ticket = ?e.ticket, "worker started");
            }
            EventKind::WorkerSucceeded => {
                tracing::info!(target: "coalescer", instance, key, worker = ?e.worker, elapsed_ms = ?e.elapsed_ms, "worker succeeded");
            }
            EventKind::WorkerFailed => {
                tracing::warn!(target: "coalescer", instance, key, worker = ?e.worker, elapsed_ms = ?e.elapsed_ms, reason = ?e.reason, "worker failed");
            }
            EventKind::ResultDispatched => {
                tracing::info!(target: "coalescer", instance, key, worker = ?e.worker, subscribers = ?e.subscribers, "result dispatched");
            }
            EventKind::WorkerRetired => {
                tracing::debug!(target: "coalescer", instance, key, worker = ?e.worker, "worker retired");
            }
            EventKind::WorkerAborted => {
                tracing::warn!(target: "coalescer", instance, key, worker = ?e.worker, reason = ?e.reason, "worker aborted");
            }
            EventKind::RequestJoined => {
                tracing::info!(target: "coalescer", instance, key, worker = ?e.worker, ticket = ?e.ticket, "request joined");
            }
            EventKind::FastPathHit => {
                tracing::info!(target: "coalescer", instance, key, worker = ?e.worker, ticket = ?e.ticket, "fast path hit");
            }
            EventKind::AwaitTimedOut => {
                tracing::warn!(target: "coalescer", instance, key, worker = ?e.worker, ticket = ?e.ticket, elapsed_ms = ?e.elapsed_ms, "await timed out");
            }
            EventKind::CrashDetected => {
                tracing::error!(target: "coalescer", instance, key, worker = ?e.worker, ticket = ?e.ticket, "crash detected");
            }
            EventKind::ObserverOverflow => {
                tracing::warn!(target: "coalescer", observer = key, reason = ?e.reason, "observer dropped event");
            }
            EventKind::ObserverPanicked => {
                tracing::error!(target: "coalescer", observer = key, reason = ?e.reason, "observer panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
