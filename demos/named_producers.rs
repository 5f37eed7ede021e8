//! # Example: named_producers
//!
//! Register producers once, then request keys by producer name.
//!
//! Also shows the built-in [`LogWriter`] observer forwarding events to `tracing`,
//! and a `linked` request whose worker is aborted when the caller walks away.
//!
//! ## Run
//! ```bash
//! RUST_LOG=coalescer=debug cargo run --example named_producers
//! ```

use std::sync::Arc;
use std::time::Duration;

use coalescer::{Coalescer, LogWriter, Observe, ProducerFn, RequestOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "coalescer=info".into()))
        .init();

    let reports: Coalescer<u32, Vec<u8>> = Coalescer::builder("reports")
        .with_observers(vec![Arc::new(LogWriter::default()) as Arc<dyn Observe>])
        .build()?;

    reports.register_producer(
        "small",
        ProducerFn::arc(|| async { Ok::<_, anyhow::Error>(vec![1u8, 2, 3]) }),
    )?;
    reports.register_producer(
        "slow",
        ProducerFn::arc(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, anyhow::Error>(vec![0u8; 1024])
        }),
    )?;

    let small = reports
        .request_named(1, "small", RequestOptions::default())?
        .wait(None)
        .await?;
    println!("[main] small report: {small:?}");

    // Dropping a linked request that was never awaited aborts its worker.
    let linked = reports.request_named(2, "slow", RequestOptions::default().linked())?;
    println!("[main] slow report in flight: {}", reports.is_in_flight(&2));
    drop(linked);
    tokio::time::sleep(Duration::from_millis(10)).await;
    println!("[main] slow report in flight after drop: {}", reports.is_in_flight(&2));

    if let Err(e) = reports.request_named(3, "missing", RequestOptions::default()) {
        println!("[main] {}", e.as_message());
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(())
}
