//! # Function-backed producer (`ProducerFn`)
//!
//! [`ProducerFn`] wraps a closure `F: Fn() -> Fut`, producing a fresh future per run.
//! The closure is `Fn`, so the same producer can back many runs (e.g. when it is
//! registered under a name).
//!
//! ## Example
//! ```rust
//! use coalescer::{ProducerFn, ProducerRef};
//!
//! let p: ProducerRef<u64> = ProducerFn::arc(|| async { Ok::<u64, std::io::Error>(42) });
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::producers::producer::Producer;

/// Function-backed producer implementation.
pub struct ProducerFn<F> {
    f: F,
}

impl<F> ProducerFn<F> {
    /// Prefer [`ProducerFn::arc`] when you immediately need a [`ProducerRef`](crate::ProducerRef).
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the producer and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut, V, E> Producer<V> for ProducerFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<anyhow::Error>,
    V: Send + 'static,
{
    async fn produce(&self) -> anyhow::Result<V> {
        (self.f)().await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::ProducerRef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn each_run_creates_a_fresh_future() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let p: ProducerRef<usize> = ProducerFn::arc(move || {
            let c = c.clone();
            async move { Ok::<_, anyhow::Error>(c.fetch_add(1, Ordering::SeqCst) + 1) }
        });

        assert_eq!(p.produce().await.expect("first"), 1);
        assert_eq!(p.produce().await.expect("second"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn foreign_errors_are_converted() {
        let p: ProducerRef<()> = ProducerFn::arc(|| async {
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
        });
        let err = p.produce().await.expect_err("must fail");
        assert_eq!(err.to_string(), "missing");
    }
}
