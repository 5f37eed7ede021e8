//! # Request handle and the await protocol.
//!
//! A [`RequestHandle`] is returned by [`Coalescer::request`](crate::Coalescer::request)
//! in one of two states:
//! - **resolved**: served from the cached terminal value (or found it on the
//!   post-subscribe re-check); no subscription and no watch remain
//! - **pending**: subscribed under its ticket and watching the worker's exit signal
//!
//! ## Await
//! ```text
//! wait(timeout)
//!   ├─ caller != owner             → OwnershipViolation (always checked first)
//!   ├─ resolved                    → value / ProducerError immediately
//!   └─ pending: select (biased)
//!        ├─ inbox: ticketed delivery  → unsubscribe → value / ProducerError
//!        ├─ worker exit signal        → terminal value if set, else CrashDetected
//!        └─ deadline                  → unsubscribe → Timeout (worker keeps running)
//! ```
//!
//! `wait` consumes the handle; `recv` borrows it so it can sit in a `select!` arm;
//! `try_take` polls without blocking.
//!
//! ## Rules
//! - Only the creating caller may take the outcome (`wait` / `recv` / `try_take`)
//! - Each handle yields at most one outcome; afterwards it is consumed
//! - Only deliveries from the handle's own worker are accepted
//! - Dropping a pending handle unsubscribes it; a `linked` handle dropped by its owner
//!   without ever being awaited also aborts the worker

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::core::coalescer::Shared;
use crate::core::key_table::{Outcome, WorkerSlot};
use crate::core::subscriptions::DeliveryRx;
use crate::core::{CallerId, CoalesceKey, CoalesceValue, Ticket, WorkerId};
use crate::error::CoalesceError;
use crate::events::EventKind;

/// Per-request options.
///
/// ## Example
/// ```
/// use std::time::Duration;
/// use coalescer::RequestOptions;
///
/// let opts = RequestOptions::default().with_timeout(Duration::from_millis(250)).linked();
/// assert_eq!(opts.timeout, Some(Duration::from_millis(250)));
/// assert!(opts.link);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Await deadline used when `wait` is called with `None`.
    pub timeout: Option<Duration>,
    /// Tie the worker's life to this handle: dropping it un-awaited aborts the worker.
    pub link: bool,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn linked(mut self) -> Self {
        self.link = true;
        self
    }
}

pub(crate) enum State<V> {
    Resolved(Outcome<V>),
    Pending {
        slot: Arc<WorkerSlot<V>>,
        inbox: DeliveryRx<V>,
    },
    Done,
}

/// What a wait ended with, before it is turned into a caller-facing result.
enum Waited<V> {
    Outcome(Outcome<V>),
    Crashed,
    TimedOut(Duration),
}

/// Caller-owned token for one coalesced request.
pub struct RequestHandle<K, V>
where
    K: CoalesceKey,
    V: CoalesceValue,
{
    key: K,
    label: Arc<str>,
    ticket: Ticket,
    worker: WorkerId,
    owner: CallerId,
    timeout: Option<Duration>,
    link_armed: bool,
    state: State<V>,
    shared: Arc<Shared<K, V>>,
}

impl<K, V> RequestHandle<K, V>
where
    K: CoalesceKey,
    V: CoalesceValue,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: K,
        label: Arc<str>,
        ticket: Ticket,
        worker: WorkerId,
        owner: CallerId,
        options: RequestOptions,
        state: State<V>,
        shared: Arc<Shared<K, V>>,
    ) -> Self {
        let link_armed = options.link && matches!(state, State::Pending { .. });
        Self {
            key,
            label,
            ticket,
            worker,
            owner,
            timeout: options.timeout.or(shared.cfg.await_timeout()),
            link_armed,
            state,
            shared,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Worker that serves (or served) this request.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn owner(&self) -> CallerId {
        self.owner
    }

    /// `true` if the outcome is already known and `wait` will not block.
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, State::Resolved(_))
    }

    /// Waits for the outcome of the request.
    ///
    /// `timeout` overrides the request's timeout, which in turn overrides
    /// [`CoalescerConfig::default_timeout`](crate::CoalescerConfig::default_timeout).
    ///
    /// Timing out only ends this wait: the worker keeps running and other subscribers
    /// still receive its result.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<V, CoalesceError> {
        let timeout = timeout.or(self.timeout);
        self.resolve(timeout).await
    }

    /// Borrowing variant of [`wait`](Self::wait) with the request's own timeout.
    ///
    /// Cancel-safe: it can sit in a `tokio::select!` arm, and a delivery that arrives
    /// while another arm wins stays queued for the next call. Each call applies the
    /// request's timeout afresh. Once it resolves, the handle is consumed.
    pub async fn recv(&mut self) -> Result<V, CoalesceError> {
        self.resolve(self.timeout).await
    }

    async fn resolve(&mut self, timeout: Option<Duration>) -> Result<V, CoalesceError> {
        // Disarmed for foreign callers too: they must not abort the worker by dropping it.
        self.link_armed = false;
        self.check_owner()?;

        let waited = match &mut self.state {
            State::Done => return Err(CoalesceError::invalid("request handle already consumed")),
            State::Resolved(outcome) => Waited::Outcome(outcome.clone()),
            State::Pending { slot, inbox } => {
                wait_for(slot, inbox, self.ticket, self.worker, timeout).await
            }
        };
        self.conclude(waited)
    }

    /// Non-blocking variant of [`wait`](Self::wait) for callers driving their own event loop.
    ///
    /// Returns `None` while neither a delivery nor an exit signal has arrived.
    /// Once it returns `Some`, the handle is consumed.
    pub fn try_take(&mut self) -> Option<Result<V, CoalesceError>> {
        if let Err(e) = self.check_owner() {
            return Some(Err(e));
        }

        let waited = match &mut self.state {
            State::Done => {
                return Some(Err(CoalesceError::invalid(
                    "request handle already consumed",
                )));
            }
            State::Resolved(outcome) => Waited::Outcome(outcome.clone()),
            State::Pending { slot, inbox } => loop {
                match inbox.try_recv() {
                    Ok(d) if d.ticket == self.ticket && d.worker == self.worker => {
                        break Waited::Outcome(d.outcome);
                    }
                    Ok(_) => continue,
                    Err(_) if slot.exited().is_cancelled() => break settle(slot),
                    Err(_) => return None,
                }
            },
        };
        self.link_armed = false;
        Some(self.conclude(waited))
    }

    fn check_owner(&self) -> Result<(), CoalesceError> {
        let caller = CallerId::current();
        if caller == self.owner {
            Ok(())
        } else {
            Err(CoalesceError::OwnershipViolation {
                key: Arc::clone(&self.label),
                owner: self.owner,
                caller,
            })
        }
    }

    /// Drops the subscription (if any), marks the handle consumed and maps the outcome.
    fn conclude(&mut self, waited: Waited<V>) -> Result<V, CoalesceError> {
        self.release();
        match waited {
            Waited::Outcome(outcome) => outcome.map_err(CoalesceError::from),
            Waited::Crashed => {
                tracing::warn!(key = %self.label, worker = %self.worker, ticket = %self.ticket, "worker exited without delivering");
                self.shared.publish(
                    self.shared
                        .event(EventKind::CrashDetected, &self.label)
                        .with_worker(self.worker)
                        .with_ticket(self.ticket),
                );
                Err(CoalesceError::CrashDetected {
                    key: Arc::clone(&self.label),
                    worker: self.worker,
                })
            }
            Waited::TimedOut(timeout) => {
                tracing::debug!(key = %self.label, ticket = %self.ticket, ?timeout, "await timed out");
                self.shared.publish(
                    self.shared
                        .event(EventKind::AwaitTimedOut, &self.label)
                        .with_worker(self.worker)
                        .with_ticket(self.ticket)
                        .with_elapsed(timeout),
                );
                Err(CoalesceError::Timeout {
                    key: Arc::clone(&self.label),
                    timeout,
                })
            }
        }
    }

    /// Returns the previous state after unsubscribing a pending handle.
    fn release(&mut self) -> State<V> {
        let prev = std::mem::replace(&mut self.state, State::Done);
        if matches!(prev, State::Pending { .. }) {
            self.shared.subscriptions.unsubscribe(&self.key, self.ticket);
        }
        prev
    }
}

impl<K, V> Drop for RequestHandle<K, V>
where
    K: CoalesceKey,
    V: CoalesceValue,
{
    fn drop(&mut self) {
        let armed = self.link_armed && CallerId::current() == self.owner;
        if let State::Pending { slot, .. } = self.release() {
            if armed && slot.abort() {
                tracing::debug!(key = %self.label, worker = %self.worker, "linked caller dropped its handle; aborting worker");
                self.shared.publish(
                    self.shared
                        .event(EventKind::WorkerAborted, &self.label)
                        .with_worker(self.worker)
                        .with_ticket(self.ticket)
                        .with_reason("linked caller dropped"),
                );
            }
        }
    }
}

impl<K, V> fmt::Debug for RequestHandle<K, V>
where
    K: CoalesceKey,
    V: CoalesceValue,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Resolved(_) => "resolved",
            State::Pending { .. } => "pending",
            State::Done => "done",
        };
        f.debug_struct("RequestHandle")
            .field("key", &self.key)
            .field("ticket", &self.ticket)
            .field("worker", &self.worker)
            .field("owner", &self.owner)
            .field("state", &state)
            .finish()
    }
}

/// Blocks until the ticketed delivery, the worker's exit, or the deadline.
async fn wait_for<V: Clone>(
    slot: &WorkerSlot<V>,
    inbox: &mut DeliveryRx<V>,
    ticket: Ticket,
    worker: WorkerId,
    timeout: Option<Duration>,
) -> Waited<V> {
    let deadline = async {
        match timeout {
            Some(d) => time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;

            msg = inbox.recv() => match msg {
                Some(d) if d.ticket == ticket && d.worker == worker => {
                    return Waited::Outcome(d.outcome);
                }
                Some(_) => continue,
                None => return settle(slot),
            },
            _ = slot.exited().cancelled() => {
                while let Ok(d) = inbox.try_recv() {
                    if d.ticket == ticket && d.worker == worker {
                        return Waited::Outcome(d.outcome);
                    }
                }
                return settle(slot);
            }
            _ = &mut deadline => return Waited::TimedOut(timeout.unwrap_or_default()),
        }
    }
}

/// After the worker is gone: its terminal value if it produced one, otherwise a crash.
fn settle<V: Clone>(slot: &WorkerSlot<V>) -> Waited<V> {
    match slot.terminal() {
        Some(outcome) => Waited::Outcome(outcome),
        None => Waited::Crashed,
    }
}
