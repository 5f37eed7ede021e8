use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::coalescer::{Coalescer, Shared};
use super::config::CoalescerConfig;
use super::{CoalesceKey, CoalesceValue};
use crate::error::CoalesceError;
use crate::events::{Bus, Event};
use crate::observers::{Observe, ObserverSet};

/// Builder for constructing a [`Coalescer`] instance.
pub struct CoalescerBuilder<K, V> {
    name: String,
    cfg: CoalescerConfig,
    observers: Vec<Arc<dyn Observe>>,
    _types: PhantomData<fn(K) -> V>,
}

impl<K, V> CoalescerBuilder<K, V>
where
    K: CoalesceKey,
    V: CoalesceValue,
{
    /// Creates a new builder with default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cfg: CoalescerConfig::default(),
            observers: Vec::new(),
            _types: PhantomData,
        }
    }

    pub fn with_config(mut self, cfg: CoalescerConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event observers.
    ///
    /// Observers receive runtime events through dedicated workers with bounded queues.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// Builds the instance.
    ///
    /// # Errors
    /// [`CoalesceError::InvalidUsage`] if the name is empty, or if observers are
    /// configured outside a tokio runtime (their workers need one).
    pub fn build(self) -> Result<Coalescer<K, V>, CoalesceError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CoalesceError::invalid("coalescer name must not be empty"));
        }

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let shared = Arc::new(Shared::new(name.into(), self.cfg, bus.clone()));

        if !self.observers.is_empty() {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(CoalesceError::invalid(
                    "observers require a tokio runtime at build time",
                ));
            }
            let set = ObserverSet::new(self.observers, bus.clone());
            observer_listener(&bus, set, shared.runtime_token.clone());
        }
        Ok(Coalescer::from_shared(shared))
    }
}

/// Forwards bus events to the observer set until the instance is dropped.
fn observer_listener(bus: &Bus, set: ObserverSet, token: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "observer listener lagged");
                        set.emit(
                            Event::observer_overflow("observer_listener", "lagged")
                                .with_subscribers(skipped as usize),
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        set.shutdown().await;
    });
}
