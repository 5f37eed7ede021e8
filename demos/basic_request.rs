//! # Example: basic_request
//!
//! One caller, one key, one producer run.
//!
//! Shows how to:
//! - Build a [`Coalescer`] with the default [`CoalescerConfig`].
//! - Wrap an async closure in [`ProducerFn`].
//! - Request a key and wait on the returned [`RequestHandle`](coalescer::RequestHandle).
//! - Tell producer failures apart from timeouts.
//!
//! ## Run
//! ```bash
//! RUST_LOG=coalescer=debug cargo run --example basic_request
//! ```

use std::time::Duration;

use coalescer::{CoalesceError, Coalescer, ProducerFn, ProducerRef, RequestOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let users: Coalescer<u64, String> = Coalescer::builder("users").build()?;

    let fetch: ProducerRef<String> = ProducerFn::arc(|| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, anyhow::Error>("alice".to_string())
    });

    let handle = users.request(42, fetch.clone(), RequestOptions::default())?;
    println!("[main] request {} served by worker {}", handle.ticket(), handle.worker());
    println!("[main] got {:?}", handle.wait(None).await?);

    // A deadline shorter than the producer only ends this wait.
    let impatient = users.request(7, fetch, RequestOptions::default())?;
    match impatient.wait(Some(Duration::from_millis(10))).await {
        Err(CoalesceError::Timeout { key, timeout }) => {
            println!("[main] gave up on {key} after {timeout:?}; worker still running");
        }
        other => println!("[main] unexpected: {other:?}"),
    }

    let broken: ProducerRef<String> =
        ProducerFn::arc(|| async { Err::<String, _>(anyhow::anyhow!("upstream unavailable")) });
    if let Err(e) = users.call(13, broken).await {
        println!("[main] {} -> {}", e.as_label(), e.as_message());
    }
    Ok(())
}
