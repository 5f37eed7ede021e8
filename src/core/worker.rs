//! # Worker: one-shot producer run for one key.
//!
//! ## Lifecycle
//! ```text
//! Created ──► Running ──► Succeeded(value) ──► dispatch ──► linger ──► Retired
//!                    └──► Failed(error)    ──► dispatch ─────────────► Retired
//! ```
//!
//! ## Flow
//! ```text
//! run()
//!   ├─► producer.produce()  (catch_unwind: panics become ProducerError)
//!   ├─► slot.set_terminal(outcome)         → WorkerSucceeded / WorkerFailed
//!   ├─► subscriptions.dispatch(key)        → ResultDispatched { subscribers }
//!   ├─► success only: wait linger | first fast-path read
//!   └─► retire: mark slot, remove own key entry → WorkerRetired
//! ```
//!
//! ## Rules
//! - The producer runs **exactly once**; there is no restart
//! - Failures are data: they are dispatched, never re-raised
//! - Terminal value is set **before** dispatch, so a subscriber that misses the snapshot
//!   finds it on its re-check
//! - Retirement runs from `Drop` as well, so an aborted or never-polled worker still
//!   clears its entry and fires the exit signal

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::time;
use tokio_util::sync::DropGuard;

use crate::core::coalescer::Shared;
use crate::core::key_table::{Outcome, WorkerSlot};
use crate::core::{CoalesceKey, CoalesceValue};
use crate::error::{FailureKind, ProducerError, panic_message};
use crate::events::EventKind;
use crate::producers::ProducerRef;

/// Runs one producer for one key and publishes the result.
pub(crate) struct Worker<K, V>
where
    K: CoalesceKey,
    V: CoalesceValue,
{
    key: K,
    label: Arc<str>,
    slot: Arc<WorkerSlot<V>>,
    producer: ProducerRef<V>,
    shared: Arc<Shared<K, V>>,
    _exit: DropGuard,
}

impl<K, V> Worker<K, V>
where
    K: CoalesceKey,
    V: CoalesceValue,
{
    /// Spawns the worker task and binds its abort handle to the slot.
    ///
    /// The exit guard is created before spawning, so it fires even if the task is
    /// aborted before its first poll.
    pub(crate) fn spawn(
        key: K,
        label: Arc<str>,
        slot: Arc<WorkerSlot<V>>,
        producer: ProducerRef<V>,
        shared: Arc<Shared<K, V>>,
    ) {
        let worker = Worker {
            _exit: slot.exited().clone().drop_guard(),
            key,
            label,
            slot: Arc::clone(&slot),
            producer,
            shared,
        };
        let join = tokio::spawn(worker.run());
        slot.bind(join.abort_handle());
    }

    async fn run(self) {
        let (outcome, elapsed) = self.invoke().await;
        self.slot.set_terminal(outcome.clone());

        match &outcome {
            Ok(_) => {
                tracing::debug!(key = %self.label, worker = %self.slot.id(), ?elapsed, "producer succeeded");
                self.shared.publish(
                    self.shared
                        .event(EventKind::WorkerSucceeded, &self.label)
                        .with_worker(self.slot.id())
                        .with_elapsed(elapsed),
                );
            }
            Err(e) => {
                tracing::warn!(key = %self.label, worker = %self.slot.id(), error = %e.message, "producer failed");
                self.shared.publish(
                    self.shared
                        .event(EventKind::WorkerFailed, &self.label)
                        .with_worker(self.slot.id())
                        .with_elapsed(elapsed)
                        .with_reason(e.message.as_str()),
                );
            }
        }

        let reached = self.shared
            .subscriptions
            .dispatch(&self.key, self.slot.id(), &outcome);
        self.shared.publish(
            self.shared
                .event(EventKind::ResultDispatched, &self.label)
                .with_worker(self.slot.id())
                .with_subscribers(reached),
        );

        if outcome.is_ok() {
            if let Some(linger) = self.shared.cfg.linger_window() {
                self.linger(linger).await;
            }
        }

        self.retire();
        self.shared.publish(
            self.shared
                .event(EventKind::WorkerRetired, &self.label)
                .with_worker(self.slot.id()),
        );
    }

    /// Invokes the producer once, converting errors and panics into data.
    async fn invoke(&self) -> (Outcome<V>, Duration) {
        let started = Instant::now();
        let res = AssertUnwindSafe(self.producer.produce())
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        let outcome = match res {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ProducerError {
                key: Arc::clone(&self.label),
                message: err.to_string(),
                kind: FailureKind::Returned,
                worker: self.slot.id(),
                context: err.chain().skip(1).map(ToString::to_string).collect(),
                elapsed,
            }),
            Err(panic) => Err(ProducerError {
                key: Arc::clone(&self.label),
                message: panic_message(panic.as_ref()),
                kind: FailureKind::Panicked,
                worker: self.slot.id(),
                context: vec!["producer panicked".to_string()],
                elapsed,
            }),
        };
        (outcome, elapsed)
    }

    /// Keeps the success visible to late joiners until the window ends or it is read once.
    async fn linger(&self, window: Duration) {
        tokio::select! {
            _ = time::sleep(window) => {}
            _ = self.slot.observed().cancelled() => {}
        }
    }

    /// Idempotent: marks the slot retired and drops the key entry if it is still ours.
    fn retire(&self) {
        self.slot.mark_retired();
        self.shared.keys.remove_if_current(&self.key, &self.slot);
    }
}

impl<K, V> Drop for Worker<K, V>
where
    K: CoalesceKey,
    V: CoalesceValue,
{
    fn drop(&mut self) {
        self.retire();
    }
}
