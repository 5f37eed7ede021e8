//! # Producer abstraction.
//!
//! A [`Producer`] is the caller-supplied zero-argument operation whose result is shared
//! between every coalesced caller. The engine only ever invokes it; it never inspects it.
//!
//! The common handle type is [`ProducerRef`], an `Arc<dyn Producer<V>>` suitable for
//! sharing across the runtime and for registering under a name.

use std::sync::Arc;

use async_trait::async_trait;

/// Shared handle to a producer.
pub type ProducerRef<V> = Arc<dyn Producer<V>>;

/// # Asynchronous, zero-argument unit of work.
///
/// Returning `Err(..)` or panicking both become a
/// [`ProducerError`](crate::ProducerError) delivered to every waiting caller.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use coalescer::Producer;
///
/// struct Config;
///
/// #[async_trait]
/// impl Producer<String> for Config {
///     async fn produce(&self) -> anyhow::Result<String> {
///         Ok("loaded".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Producer<V>: Send + Sync + 'static {
    /// Runs the work once.
    async fn produce(&self) -> anyhow::Result<V>;
}
