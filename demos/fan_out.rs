//! # Example: fan_out
//!
//! A burst of concurrent callers for a handful of hot keys.
//!
//! Every caller runs in its own task and awaits its own handle; the producer runs once
//! per key. A caller that shows up during the linger window is answered from the
//! cached value without starting a new run.
//!
//! ## Flow
//! ```text
//! 50 tasks ──► request("config:a" | "config:b")
//!                 ├─ first per key ─► Worker::run() ─► produce() (once)
//!                 └─ the rest      ─► joined, wait for the dispatch
//! late task ──► request("config:a") ─► fast path (cached value)
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example fan_out
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use coalescer::{Coalescer, ProducerFn, ProducerRef, RequestOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let configs: Coalescer<String, Arc<str>> = Coalescer::builder("configs").build()?;
    let runs = Arc::new(AtomicUsize::new(0));

    let load: ProducerRef<Arc<str>> = {
        let runs = Arc::clone(&runs);
        ProducerFn::arc(move || {
            let runs = Arc::clone(&runs);
            async move {
                let n = runs.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, anyhow::Error>(Arc::<str>::from(format!("payload from run #{n}")))
            }
        })
    };

    let mut tasks = Vec::new();
    for i in 0..50 {
        let configs = configs.clone();
        let load = Arc::clone(&load);
        let key = if i % 2 == 0 { "config:a" } else { "config:b" }.to_string();
        tasks.push(tokio::spawn(async move { configs.call(key, load).await }));
    }
    for t in tasks {
        t.await??;
    }
    println!("[fan_out] 50 callers, {} producer runs", runs.load(Ordering::SeqCst));

    let late = configs.request("config:a".into(), Arc::clone(&load), RequestOptions::default())?;
    println!(
        "[fan_out] late caller resolved without waiting: {}",
        late.is_resolved()
    );
    println!("[fan_out] late caller got {:?}", late.wait(None).await?);
    println!("[fan_out] total producer runs: {}", runs.load(Ordering::SeqCst));
    Ok(())
}
