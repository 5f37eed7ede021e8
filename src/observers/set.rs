//! # Non-blocking event fan-out to multiple observers.
//!
//! Provides [`ObserverSet`], which distributes events to multiple observers
//! concurrently without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► observer1.on_event()
//!     │    (bounded)         └──────► panic → ObserverPanicked
//!     ├──► [queue 2] ──► worker 2 ──► observer2.on_event()
//!     └──► [queue N] ──► worker N ──► observerN.on_event()
//! ```
//!
//! ## Rules
//! - **No cross-observer ordering**: observer A may process event N while B processes N+5
//! - **Overflow**: event dropped for that observer only, `ObserverOverflow` published
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Per-observer FIFO**: each observer sees events in order
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if an observer uses `Arc<Mutex<T>>` and panics while holding the lock.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::panic_message;
use crate::events::{Bus, Event};

use super::Observe;

/// Per-observer channel metadata.
struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event observers.
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl ObserverSet {
    /// Creates a new set and spawns one worker task per observer.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for obs in observers {
            let cap = obs.queue_capacity().max(1);
            let name = obs.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = obs.on_event(ev.as_ref());

                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = panic_message(panic_err.as_ref());
                        tracing::warn!(observer = obs.name(), %info, "observer panicked");
                        bus_for_worker.publish(Event::observer_panicked(obs.name(), info));
                    }
                }
            });
            channels.push(ObserverChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Emits an event to all observers.
    ///
    /// Overflow events that themselves overflow are not re-published.
    pub fn emit(&self, event: Event) {
        let is_overflow_evt = event.is_observer_overflow();
        let event = Arc::new(event);

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow_evt {
                self.bus.publish(Event::observer_overflow(channel.name, reason));
            }
        }
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Closes all queues and waits for the observer workers to drain them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Observe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.seen.lock().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Observe for Panicker {
        async fn on_event(&self, _event: &Event) {
            panic!("observer exploded");
        }

        fn name(&self) -> &'static str {
            "panicker"
        }
    }

    #[tokio::test]
    async fn every_observer_sees_every_event_in_order() {
        let bus = Bus::new(16);
        let rec = Arc::new(Recorder::default());
        let set = ObserverSet::new(vec![rec.clone() as Arc<dyn Observe>], bus);

        set.emit(Event::new(EventKind::WorkerStarted));
        set.emit(Event::new(EventKind::WorkerSucceeded));
        set.shutdown().await;

        assert_eq!(
            *rec.seen.lock(),
            vec![EventKind::WorkerStarted, EventKind::WorkerSucceeded]
        );
    }

    #[tokio::test]
    async fn panicking_observer_is_reported_on_the_bus() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = ObserverSet::new(vec![Arc::new(Panicker) as Arc<dyn Observe>], bus);

        set.emit(Event::new(EventKind::WorkerStarted));
        let ev = rx.recv().await.expect("panic event");
        assert_eq!(ev.kind, EventKind::ObserverPanicked);
        assert_eq!(ev.key.as_deref(), Some("panicker"));
        assert_eq!(ev.reason.as_deref(), Some("observer exploded"));
        set.shutdown().await;
    }
}
