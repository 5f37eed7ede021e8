//! Error types used by the coalescer and its producers.
//!
//! This module defines:
//!
//! - [`CoalesceError`]: everything a caller can observe from [`request`](crate::Coalescer::request)
//!   or [`wait`](crate::RequestHandle::wait).
//! - [`ProducerError`]: a captured producer failure, fanned out as data to every subscriber.
//!
//! Both provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::{CallerId, WorkerId};

/// How a producer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The producer returned `Err(..)`.
    Returned,
    /// The producer panicked; the panic was caught at the worker boundary.
    Panicked,
}

/// # A captured producer failure.
///
/// Built once by the worker and cloned to every subscriber that was waiting on the run.
/// It is never cached: the next request for the same key starts a fresh producer.
#[derive(Error, Debug, Clone)]
#[error("producer for key {key} failed: {message}")]
pub struct ProducerError {
    /// Rendered (`Debug`) key of the run that failed.
    pub key: Arc<str>,
    /// Top-level error message or panic payload.
    pub message: String,
    /// Whether the producer returned an error or panicked.
    pub kind: FailureKind,
    /// Worker that ran the producer.
    pub worker: WorkerId,
    /// Cause chain below `message` (outermost first), best effort.
    pub context: Vec<String>,
    /// Time spent inside the producer.
    pub elapsed: Duration,
}

impl ProducerError {
    /// Returns `true` if the producer panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        self.kind == FailureKind::Panicked
    }
}

/// # Errors surfaced by the coalescer.
///
/// `OwnershipViolation` and `InvalidUsage` are programming errors and should not be retried.
/// `Timeout` and `CrashDetected` only end the caller's wait; they never touch the worker
/// or other subscribers.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum CoalesceError {
    /// The producer failed; delivered as ordinary data to every current subscriber.
    #[error(transparent)]
    Producer(#[from] ProducerError),

    /// No delivery and no crash signal arrived before the deadline.
    #[error("timed out after {timeout:?} waiting for key {key}")]
    Timeout {
        /// Rendered key.
        key: Arc<str>,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The watched worker vanished without delivering a result.
    #[error("worker {worker} for key {key} terminated without delivering a result")]
    CrashDetected {
        /// Rendered key.
        key: Arc<str>,
        /// Worker that was being watched.
        worker: WorkerId,
    },

    /// `wait` was called by a caller that did not create the handle.
    #[error("handle for key {key} is owned by {owner}, awaited by {caller}")]
    OwnershipViolation {
        /// Rendered key.
        key: Arc<str>,
        /// Creator of the handle.
        owner: CallerId,
        /// Caller that attempted the wait.
        caller: CallerId,
    },

    /// Malformed arguments at the API boundary.
    #[error("invalid usage: {reason}")]
    InvalidUsage {
        /// What was wrong.
        reason: String,
    },
}

impl CoalesceError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        CoalesceError::InvalidUsage {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use coalescer::CoalesceError;
    /// use std::time::Duration;
    ///
    /// let err = CoalesceError::Timeout { key: "\"k\"".into(), timeout: Duration::from_millis(1) };
    /// assert_eq!(err.as_label(), "await_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CoalesceError::Producer(_) => "producer_failed",
            CoalesceError::Timeout { .. } => "await_timeout",
            CoalesceError::CrashDetected { .. } => "worker_crashed",
            CoalesceError::OwnershipViolation { .. } => "ownership_violation",
            CoalesceError::InvalidUsage { .. } => "invalid_usage",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            CoalesceError::Producer(e) => format!("producer: {} (key={})", e.message, e.key),
            CoalesceError::Timeout { key, timeout } => format!("timeout: {timeout:?} (key={key})"),
            CoalesceError::CrashDetected { key, worker } => {
                format!("crash: worker={worker} (key={key})")
            }
            CoalesceError::OwnershipViolation { key, owner, caller } => {
                format!("ownership: owner={owner} caller={caller} (key={key})")
            }
            CoalesceError::InvalidUsage { reason } => format!("invalid usage: {reason}"),
        }
    }

    /// Indicates a bug in the calling code rather than a runtime condition.
    ///
    /// # Example
    /// ```
    /// use coalescer::CoalesceError;
    ///
    /// let err = CoalesceError::InvalidUsage { reason: "empty name".into() };
    /// assert!(err.is_programming_error());
    /// ```
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            CoalesceError::OwnershipViolation { .. } | CoalesceError::InvalidUsage { .. }
        )
    }

    /// Returns the producer failure, if this error carries one.
    pub fn producer_error(&self) -> Option<&ProducerError> {
        match self {
            CoalesceError::Producer(e) => Some(e),
            _ => None,
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_rendered_as_text() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    fn producer_error() -> ProducerError {
        ProducerError {
            key: "\"k\"".into(),
            message: "boom".into(),
            kind: FailureKind::Panicked,
            worker: WorkerId::from_raw(7),
            context: vec![],
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn producer_error_converts_and_keeps_its_label() {
        let err: CoalesceError = producer_error().into();
        assert_eq!(err.as_label(), "producer_failed");
        assert!(err.producer_error().is_some_and(ProducerError::is_panic));
        assert!(!err.is_programming_error());
        assert_eq!(err.to_string(), "producer for key \"k\" failed: boom");
    }

    #[test]
    fn crash_and_timeout_are_runtime_conditions() {
        let crash = CoalesceError::CrashDetected {
            key: "1".into(),
            worker: WorkerId::from_raw(3),
        };
        assert_eq!(crash.as_label(), "worker_crashed");
        assert!(!crash.is_programming_error());
        assert!(crash.as_message().contains("worker=w3"));
    }
}
