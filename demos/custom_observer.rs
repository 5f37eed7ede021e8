//! # Example: custom_observer
//!
//! Demonstrates how to build and attach a custom event observer.
//!
//! Shows how to:
//! - Implement the [`Observe`] trait.
//! - Inspect [`Event`] / [`EventKind`] for coalescing metrics.
//! - Wire the observer in with [`CoalescerBuilder::with_observers`](coalescer::CoalescerBuilder::with_observers).
//!
//! ## Flow
//! ```text
//! request() ──► Worker::run()
//!     ├─► publish(WorkerStarted / RequestJoined / FastPathHit)
//!     ├─► publish(WorkerSucceeded | WorkerFailed)
//!     ├─► publish(ResultDispatched / WorkerRetired)
//!     └─► observer listener ──► ObserverSet.emit() ──► Counters.on_event()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example custom_observer
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use coalescer::{Coalescer, Event, EventKind, Observe, ProducerFn, ProducerRef, RequestOptions};

/// Counts how requests were served.
/// In real life, you could export these as metrics.
#[derive(Default)]
struct Counters {
    runs: AtomicU64,
    joins: AtomicU64,
    fast_path: AtomicU64,
    failures: AtomicU64,
}

#[async_trait::async_trait]
impl Observe for Counters {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::WorkerStarted => {
                self.runs.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::RequestJoined => {
                self.joins.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::FastPathHit => {
                self.fast_path.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::WorkerFailed => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                println!(
                    "[obs] failure: key={} reason={}",
                    ev.key.as_deref().unwrap_or("<unknown>"),
                    ev.reason.as_deref().unwrap_or("<none>")
                );
            }
            EventKind::ResultDispatched => {
                println!(
                    "[obs] dispatched: key={} subscribers={}",
                    ev.key.as_deref().unwrap_or("<unknown>"),
                    ev.subscribers.unwrap_or(0)
                );
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "counters"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let counters = Arc::new(Counters::default());
    let prices: Coalescer<&'static str, u64> = Coalescer::builder("prices")
        .with_observers(vec![counters.clone() as Arc<dyn Observe>])
        .build()?;

    let quote: ProducerRef<u64> = ProducerFn::arc(|| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<u64, anyhow::Error>(1999)
    });

    let handles = (0..5)
        .map(|_| prices.request("sku-1", quote.clone(), RequestOptions::default()))
        .collect::<Result<Vec<_>, _>>()?;
    for h in handles {
        h.wait(None).await?;
    }
    prices.call("sku-1", quote).await?;

    let broken: ProducerRef<u64> =
        ProducerFn::arc(|| async { Err::<u64, _>(anyhow::anyhow!("pricing service down")) });
    let _ = prices.call("sku-2", broken).await;

    // Give the observer worker a moment to drain its queue.
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!(
        "[main] runs={} joins={} fast_path={} failures={}",
        counters.runs.load(Ordering::Relaxed),
        counters.joins.load(Ordering::Relaxed),
        counters.fast_path.load(Ordering::Relaxed),
        counters.failures.load(Ordering::Relaxed),
    );
    Ok(())
}
