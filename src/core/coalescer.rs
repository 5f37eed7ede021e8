//! # Coalescer: start-or-join, subscription and request entry points.
//!
//! The [`Coalescer`] owns one instance's key table, subscription table, named
//! producers and event bus. It is a cheap `Clone` handle; every clone addresses the
//! same instance.
//!
//! ## Request flow
//! ```text
//! request(key, producer, options)
//!   ├─► mint ticket, capture caller identity
//!   ├─► KeyTable::start_or_join(key)            (one entry lock)
//!   │     ├─ Cached(value)  ─► FastPathHit ─► handle resolved, no subscription
//!   │     ├─ Joined(slot)   ─► RequestJoined ─► attach()
//!   │     └─ Started(slot)  ─► WorkerStarted ─► attach() ─► Worker::spawn()
//!   └─► attach(): subscribe(key, worker, ticket, tx), then re-check slot terminal
//!          ├─ terminal set  → unsubscribe → handle resolved
//!          └─ still running → handle pending (inbox + exit-signal watch)
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use coalescer::{Coalescer, ProducerFn, ProducerRef, RequestOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let c: Coalescer<String, u64> = Coalescer::builder("users").build()?;
//!
//!     let load: ProducerRef<u64> = ProducerFn::arc(|| async {
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!         Ok::<u64, std::io::Error>(42)
//!     });
//!
//!     let a = c.request("user:1".to_string(), load.clone(), RequestOptions::default())?;
//!     let b = c.request("user:1".to_string(), load, RequestOptions::default())?;
//!     assert_eq!(a.worker(), b.worker());
//!
//!     assert_eq!(a.wait(None).await?, 42);
//!     assert_eq!(b.wait(None).await?, 42);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::builder::CoalescerBuilder;
use crate::core::config::CoalescerConfig;
use crate::core::handle::{RequestHandle, RequestOptions, State};
use crate::core::key_table::{Admission, KeyTable, WorkerSlot};
use crate::core::subscriptions::SubscriptionTable;
use crate::core::worker::Worker;
use crate::core::{CallerId, CoalesceKey, CoalesceValue, Ticket};
use crate::error::CoalesceError;
use crate::events::{Bus, Event, EventKind};
use crate::producers::ProducerRef;

/// State shared by every clone of a [`Coalescer`], its handles and its workers.
pub(crate) struct Shared<K, V> {
    pub(crate) name: Arc<str>,
    pub(crate) cfg: CoalescerConfig,
    pub(crate) keys: KeyTable<K, V>,
    pub(crate) subscriptions: SubscriptionTable<K, V>,
    pub(crate) producers: DashMap<String, ProducerRef<V>>,
    pub(crate) bus: Bus,
    /// Cancelled on drop; stops the observer listener.
    pub(crate) runtime_token: CancellationToken,
}

impl<K, V> Shared<K, V>
where
    K: CoalesceKey,
    V: CoalesceValue,
{
    pub(crate) fn new(name: Arc<str>, cfg: CoalescerConfig, bus: Bus) -> Self {
        Self {
            name,
            cfg,
            keys: KeyTable::new(),
            subscriptions: SubscriptionTable::new(),
            producers: DashMap::new(),
            bus,
            runtime_token: CancellationToken::new(),
        }
    }

    /// Event stamped with this instance and a rendered key.
    pub(crate) fn event(&self, kind: EventKind, label: &Arc<str>) -> Event {
        Event::new(kind)
            .with_instance(Arc::clone(&self.name))
            .with_key(Arc::clone(label))
    }

    pub(crate) fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }
}

impl<K, V> Drop for Shared<K, V> {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}

/// One coalescer instance.
pub struct Coalescer<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for Coalescer<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Coalescer<K, V>
where
    K: CoalesceKey,
    V: CoalesceValue,
{
    /// Starts building an instance addressed by `name`.
    pub fn builder(name: impl Into<String>) -> CoalescerBuilder<K, V> {
        CoalescerBuilder::new(name)
    }

    pub(crate) fn from_shared(shared: Arc<Shared<K, V>>) -> Self {
        Self { shared }
    }

    /// Instance name given to the builder.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.shared.cfg
    }

    /// Starts or joins the coalesced run for `key`.
    ///
    /// The returned handle is owned by the calling task (or thread, outside a task);
    /// only that caller may [`wait`](RequestHandle::wait) on it.
    ///
    /// # Errors
    /// [`CoalesceError::InvalidUsage`] when called outside a tokio runtime.
    pub fn request(
        &self,
        key: K,
        producer: ProducerRef<V>,
        options: RequestOptions,
    ) -> Result<RequestHandle<K, V>, CoalesceError> {
        ensure_runtime()?;

        let ticket = Ticket::mint();
        let owner = CallerId::current();
        let label: Arc<str> = format!("{key:?}").into();

        let (worker, state) = match self.shared.keys.start_or_join(&key) {
            Admission::Cached { value, worker } => {
                tracing::debug!(key = %label, %worker, %ticket, "served from cached terminal value");
                self.shared.publish(
                    self.shared
                        .event(EventKind::FastPathHit, &label)
                        .with_worker(worker)
                        .with_ticket(ticket),
                );
                (worker, State::Resolved(Ok(value)))
            }
            Admission::Joined(slot) => {
                let worker = slot.id();
                tracing::debug!(key = %label, %worker, %ticket, "joined running worker");
                self.shared.publish(
                    self.shared
                        .event(EventKind::RequestJoined, &label)
                        .with_worker(worker)
                        .with_ticket(ticket),
                );
                (worker, self.attach(&key, ticket, slot))
            }
            Admission::Started(slot) => {
                let worker = slot.id();
                tracing::debug!(key = %label, %worker, %ticket, "starting worker");
                self.shared.publish(
                    self.shared
                        .event(EventKind::WorkerStarted, &label)
                        .with_worker(worker)
                        .with_ticket(ticket),
                );
                let state = self.attach(&key, ticket, Arc::clone(&slot));
                Worker::spawn(
                    key.clone(),
                    Arc::clone(&label),
                    slot,
                    producer,
                    Arc::clone(&self.shared),
                );
                (worker, state)
            }
        };

        Ok(RequestHandle::new(
            key,
            label,
            ticket,
            worker,
            owner,
            options,
            state,
            Arc::clone(&self.shared),
        ))
    }

    /// Like [`request`](Self::request), with a producer registered under `name`.
    ///
    /// # Errors
    /// [`CoalesceError::InvalidUsage`] if no producer is registered under `name`.
    pub fn request_named(
        &self,
        key: K,
        name: &str,
        options: RequestOptions,
    ) -> Result<RequestHandle<K, V>, CoalesceError> {
        let producer = self
            .shared
            .producers
            .get(name)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| CoalesceError::invalid(format!("no producer registered as {name:?}")))?;
        self.request(key, producer, options)
    }

    /// Registers a producer under `name`, returning the one it replaced.
    ///
    /// # Errors
    /// [`CoalesceError::InvalidUsage`] for an empty name.
    pub fn register_producer(
        &self,
        name: impl Into<String>,
        producer: ProducerRef<V>,
    ) -> Result<Option<ProducerRef<V>>, CoalesceError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoalesceError::invalid("producer name must not be empty"));
        }
        Ok(self.shared.producers.insert(name, producer))
    }

    /// Request and wait in one step, with default options.
    pub async fn call(&self, key: K, producer: ProducerRef<V>) -> Result<V, CoalesceError> {
        self.request(key, producer, RequestOptions::default())?
            .wait(None)
            .await
    }

    /// Kills the running worker for `key`; its current subscribers observe `CrashDetected`.
    ///
    /// Returns `false` (and leaves the entry alone) if no producer is running for `key`:
    /// nothing is in flight, the run already finished (a lingering success), or the
    /// worker has not been bound to its task yet.
    pub fn abort(&self, key: &K) -> bool {
        let Some(slot) = self.shared.keys.get(key) else {
            return false;
        };
        if slot.terminal().is_some() || !slot.abort() {
            return false;
        }
        slot.mark_retired();
        self.shared.keys.remove_if_current(key, &slot);

        let label: Arc<str> = format!("{key:?}").into();
        tracing::warn!(key = %label, worker = %slot.id(), "worker aborted");
        self.shared.publish(
            self.shared
                .event(EventKind::WorkerAborted, &label)
                .with_worker(slot.id())
                .with_reason("aborted"),
        );
        true
    }

    /// `true` while a worker (running or lingering) holds the key.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.shared.keys.contains(key)
    }

    /// Number of keys with a running or lingering worker.
    pub fn in_flight_len(&self) -> usize {
        self.shared.keys.len()
    }

    /// Number of callers currently subscribed under `key`.
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.shared.subscriptions.count(key)
    }

    /// Subscribes `ticket` and re-reads the terminal slot to close the dispatch race.
    fn attach(&self, key: &K, ticket: Ticket, slot: Arc<WorkerSlot<V>>) -> State<V> {
        let (tx, inbox) = mpsc::unbounded_channel();
        self.shared.subscriptions.subscribe(key, slot.id(), ticket, tx);

        match slot.terminal() {
            Some(outcome) => {
                self.shared.subscriptions.unsubscribe(key, ticket);
                State::Resolved(outcome)
            }
            None => State::Pending { slot, inbox },
        }
    }
}

fn ensure_runtime() -> Result<(), CoalesceError> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|_| CoalesceError::invalid("must be called from within a tokio runtime"))
}
