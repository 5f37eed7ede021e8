//! # Subscription table: key → { ticket → (worker, delivery channel) }.
//!
//! Callers register here after joining a worker; the worker's one dispatch pass
//! takes a point-in-time snapshot of the subscribers **of that worker** and sends each
//! its own ticketed copy of the terminal value.
//!
//! ## Rules
//! - `dispatch` never removes or locks entries beyond the snapshot read
//! - A worker only reaches subscribers registered against its own id; callers of an
//!   earlier (aborted, failed) or later run of the same key are never served by it
//! - Entries registered after the snapshot are not covered (see the terminal re-check in `request`)
//! - Removal is always the subscriber's job (`unsubscribe`), never the worker's
//! - Empty per-key sets are dropped so the table does not grow with dead keys

use std::collections::HashMap;
use std::hash::Hash;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::core::key_table::Outcome;
use crate::core::{Ticket, WorkerId};

/// One ticketed message from a worker to a subscriber.
pub(crate) struct Delivery<V> {
    pub(crate) ticket: Ticket,
    pub(crate) worker: WorkerId,
    pub(crate) outcome: Outcome<V>,
}

pub(crate) type DeliveryTx<V> = mpsc::UnboundedSender<Delivery<V>>;
pub(crate) type DeliveryRx<V> = mpsc::UnboundedReceiver<Delivery<V>>;

struct Subscriber<V> {
    worker: WorkerId,
    tx: DeliveryTx<V>,
}

/// Concurrent multi-map of current subscribers per key.
pub(crate) struct SubscriptionTable<K, V> {
    entries: DashMap<K, HashMap<Ticket, Subscriber<V>>>,
}

impl<K, V> SubscriptionTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Registers `ticket` as waiting on `worker`'s run for `key`.
    pub(crate) fn subscribe(&self, key: &K, worker: WorkerId, ticket: Ticket, tx: DeliveryTx<V>) {
        self.entries
            .entry(key.clone())
            .or_default()
            .insert(ticket, Subscriber { worker, tx });
    }

    pub(crate) fn unsubscribe(&self, key: &K, ticket: Ticket) {
        if let Some(mut set) = self.entries.get_mut(key) {
            set.remove(&ticket);
        }
        self.entries.remove_if(key, |_, set| set.is_empty());
    }

    /// Sends `outcome` to every subscriber of `worker` present right now.
    /// Returns the number reached.
    pub(crate) fn dispatch(&self, key: &K, worker: WorkerId, outcome: &Outcome<V>) -> usize {
        let snapshot: Vec<(Ticket, DeliveryTx<V>)> = match self.entries.get(key) {
            Some(set) => set
                .iter()
                .filter(|(_, sub)| sub.worker == worker)
                .map(|(t, sub)| (*t, sub.tx.clone()))
                .collect(),
            None => return 0,
        };

        snapshot
            .into_iter()
            .filter(|(ticket, tx)| {
                tx.send(Delivery {
                    ticket: *ticket,
                    worker,
                    outcome: outcome.clone(),
                })
                .is_ok()
            })
            .count()
    }

    pub(crate) fn count(&self, key: &K) -> usize {
        self.entries.get(key).map(|set| set.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_gets_its_own_ticketed_copy() {
        let table: SubscriptionTable<&str, String> = SubscriptionTable::new();
        let w = WorkerId::from_raw(1);
        let (t1, t2) = (Ticket::mint(), Ticket::mint());
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        table.subscribe(&"k", w, t1, tx1);
        table.subscribe(&"k", w, t2, tx2);

        assert_eq!(table.dispatch(&"k", w, &Ok("v".to_string())), 2);

        let d1 = rx1.try_recv().expect("first delivery");
        let d2 = rx2.try_recv().expect("second delivery");
        assert_eq!(d1.ticket, t1);
        assert_eq!(d2.ticket, t2);
        assert_eq!(d1.worker, w);
        assert!(matches!(d1.outcome, Ok(ref v) if v == "v"));
        assert!(matches!(d2.outcome, Ok(ref v) if v == "v"));
        assert_eq!(table.count(&"k"), 2, "dispatch must not consume entries");
    }

    #[test]
    fn dispatch_only_reaches_subscribers_of_the_same_worker() {
        let table: SubscriptionTable<&str, u8> = SubscriptionTable::new();
        let (old, new) = (WorkerId::from_raw(1), WorkerId::from_raw(2));
        let (tx_old, mut rx_old) = mpsc::unbounded_channel();
        let (tx_new, mut rx_new) = mpsc::unbounded_channel();
        table.subscribe(&"k", old, Ticket::mint(), tx_old);
        table.subscribe(&"k", new, Ticket::mint(), tx_new);

        assert_eq!(table.dispatch(&"k", old, &Ok(1)), 1);
        assert!(rx_new.try_recv().is_err());
        assert_eq!(rx_old.try_recv().expect("own delivery").worker, old);
    }

    #[test]
    fn dispatch_is_a_snapshot() {
        let table: SubscriptionTable<&str, u8> = SubscriptionTable::new();
        let w = WorkerId::from_raw(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(table.dispatch(&"k", w, &Ok(1)), 0);

        table.subscribe(&"k", w, Ticket::mint(), tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_drops_empty_keys() {
        let table: SubscriptionTable<&str, u8> = SubscriptionTable::new();
        let ticket = Ticket::mint();
        let (tx, _rx) = mpsc::unbounded_channel();
        table.subscribe(&"k", WorkerId::from_raw(1), ticket, tx);
        table.unsubscribe(&"k", ticket);

        assert_eq!(table.count(&"k"), 0);
        assert!(table.entries.is_empty());
    }

    #[test]
    fn closed_receivers_are_not_counted() {
        let table: SubscriptionTable<&str, u8> = SubscriptionTable::new();
        let w = WorkerId::from_raw(1);
        let (tx, rx) = mpsc::unbounded_channel();
        table.subscribe(&"k", w, Ticket::mint(), tx);
        drop(rx);
        assert_eq!(table.dispatch(&"k", w, &Ok(1)), 0);
    }
}
