//! # Key table: key → worker slot, with atomic start-or-join.
//!
//! The table owns one [`WorkerSlot`] per key while a producer run is in flight
//! (and, after a success, for the linger window).
//!
//! ## Admission
//! ```text
//! start_or_join(key)            (single DashMap entry lock, no check-then-act)
//!   ├─ vacant                              → insert fresh slot → Started
//!   ├─ occupied, running                   → Joined(slot)
//!   ├─ occupied, succeeded (lingering)     → remove entry, wake worker → Cached(value)
//!   └─ occupied, failed or retired         → replace with fresh slot → Started
//! ```
//!
//! ## Rules
//! - At most one non-retired slot per key at any instant
//! - Failures are never served from the table
//! - A slot is removed only by its own worker, by the first fast-path reader, or by a
//!   successful `abort`;
//!   removal always checks slot identity so a successor is never evicted

use std::hash::Hash;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::core::WorkerId;
use crate::error::ProducerError;

/// Terminal value of one run.
pub(crate) type Outcome<V> = Result<V, ProducerError>;

/// Shared state of one worker, readable by joiners.
pub(crate) struct WorkerSlot<V> {
    id: WorkerId,
    terminal: Mutex<Option<Outcome<V>>>,
    retired: AtomicBool,
    /// Fires when the worker future is dropped, for any reason.
    exited: CancellationToken,
    /// Fired by the first fast-path reader to end the linger window early.
    observed: CancellationToken,
    abort: OnceLock<AbortHandle>,
}

impl<V: Clone> WorkerSlot<V> {
    pub(crate) fn new() -> Self {
        Self {
            id: WorkerId::next(),
            terminal: Mutex::new(None),
            retired: AtomicBool::new(false),
            exited: CancellationToken::new(),
            observed: CancellationToken::new(),
            abort: OnceLock::new(),
        }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Stores the terminal value. The slot is immutable afterwards.
    pub(crate) fn set_terminal(&self, outcome: Outcome<V>) {
        let mut slot = self.terminal.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
    }

    /// Clone of the terminal value, if the producer has finished.
    pub(crate) fn terminal(&self) -> Option<Outcome<V>> {
        self.terminal.lock().clone()
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn mark_retired(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub(crate) fn exited(&self) -> &CancellationToken {
        &self.exited
    }

    pub(crate) fn observed(&self) -> &CancellationToken {
        &self.observed
    }

    pub(crate) fn bind(&self, handle: AbortHandle) {
        let _ = self.abort.set(handle);
    }

    /// Kills the worker task. Returns `false` if it was already gone.
    pub(crate) fn abort(&self) -> bool {
        if self.exited.is_cancelled() {
            return false;
        }
        match self.abort.get() {
            Some(h) => {
                h.abort();
                true
            }
            None => false,
        }
    }
}

/// Result of [`KeyTable::start_or_join`].
pub(crate) enum Admission<V> {
    /// A fresh slot was inserted; the caller must spawn its worker.
    Started(Arc<WorkerSlot<V>>),
    /// A worker is already running for the key.
    Joined(Arc<WorkerSlot<V>>),
    /// The previous run succeeded and its value was still cached.
    Cached { value: V, worker: WorkerId },
}

/// Concurrent key → slot map.
pub(crate) struct KeyTable<K, V> {
    slots: DashMap<K, Arc<WorkerSlot<V>>>,
}

impl<K, V> KeyTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Atomically starts a fresh slot for `key` or joins the existing one.
    pub(crate) fn start_or_join(&self, key: &K) -> Admission<V> {
        match self.slots.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                let slot = Arc::new(WorkerSlot::new());
                vacant.insert(Arc::clone(&slot));
                Admission::Started(slot)
            }
            Entry::Occupied(mut occupied) => {
                let current = Arc::clone(occupied.get());
                if !current.is_retired() {
                    match current.terminal() {
                        None => return Admission::Joined(current),
                        Some(Ok(value)) => {
                            occupied.remove();
                            current.observed().cancel();
                            return Admission::Cached {
                                value,
                                worker: current.id(),
                            };
                        }
                        Some(Err(_)) => {}
                    }
                }
                let slot = Arc::new(WorkerSlot::new());
                occupied.insert(Arc::clone(&slot));
                Admission::Started(slot)
            }
        }
    }

    /// Removes `key` only if it still maps to `slot`.
    pub(crate) fn remove_if_current(&self, key: &K, slot: &Arc<WorkerSlot<V>>) -> bool {
        self.slots
            .remove_if(key, |_, current| Arc::ptr_eq(current, slot))
            .is_some()
    }

    /// Current slot for `key`, without touching the entry.
    pub(crate) fn get(&self, key: &K) -> Option<Arc<WorkerSlot<V>>> {
        self.slots.get(key).map(|slot| Arc::clone(slot.value()))
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::time::Duration;

    fn failure(worker: WorkerId) -> ProducerError {
        ProducerError {
            key: "\"k\"".into(),
            message: "boom".into(),
            kind: FailureKind::Returned,
            worker,
            context: vec![],
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn second_admission_joins_the_running_slot() {
        let table: KeyTable<&str, u32> = KeyTable::new();
        let Admission::Started(first) = table.start_or_join(&"k") else {
            panic!("expected Started");
        };
        let Admission::Joined(second) = table.start_or_join(&"k") else {
            panic!("expected Joined");
        };
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn distinct_keys_never_share_a_slot() {
        let table: KeyTable<&str, u32> = KeyTable::new();
        let (Admission::Started(a), Admission::Started(b)) =
            (table.start_or_join(&"a"), table.start_or_join(&"b"))
        else {
            panic!("expected two starts");
        };
        assert_ne!(a.id(), b.id());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn cached_success_is_served_once_then_evicted() {
        let table: KeyTable<&str, u32> = KeyTable::new();
        let Admission::Started(slot) = table.start_or_join(&"k") else {
            panic!("expected Started");
        };
        slot.set_terminal(Ok(7));

        match table.start_or_join(&"k") {
            Admission::Cached { value, worker } => {
                assert_eq!(value, 7);
                assert_eq!(worker, slot.id());
            }
            _ => panic!("expected Cached"),
        }
        assert!(slot.observed().is_cancelled());
        assert!(!table.contains(&"k"));
        assert!(matches!(table.start_or_join(&"k"), Admission::Started(_)));
    }

    #[test]
    fn failed_slot_is_replaced_not_served() {
        let table: KeyTable<&str, u32> = KeyTable::new();
        let Admission::Started(old) = table.start_or_join(&"k") else {
            panic!("expected Started");
        };
        old.set_terminal(Err(failure(old.id())));

        let Admission::Started(fresh) = table.start_or_join(&"k") else {
            panic!("failure must not be cached");
        };
        assert_ne!(old.id(), fresh.id());
        assert!(!table.remove_if_current(&"k", &old));
        assert!(table.remove_if_current(&"k", &fresh));
    }

    #[test]
    fn get_reads_without_evicting() {
        let table: KeyTable<&str, u32> = KeyTable::new();
        assert!(table.get(&"k").is_none());
        let Admission::Started(slot) = table.start_or_join(&"k") else {
            panic!("expected Started");
        };
        let seen = table.get(&"k").expect("slot");
        assert!(Arc::ptr_eq(&seen, &slot));
        assert!(table.contains(&"k"));
    }

    #[test]
    fn unbound_slot_cannot_be_aborted() {
        let slot: WorkerSlot<u32> = WorkerSlot::new();
        assert!(!slot.abort());
    }

    #[test]
    fn terminal_slot_is_write_once() {
        let slot: WorkerSlot<u32> = WorkerSlot::new();
        slot.set_terminal(Ok(1));
        slot.set_terminal(Ok(2));
        assert!(matches!(slot.terminal(), Some(Ok(1))));
    }
}
