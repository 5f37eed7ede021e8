//! # Coalescer configuration.
//!
//! Provides [`CoalescerConfig`] centralized settings for one coalescer instance.
//!
//! ## Sentinel values
//! - `default_timeout = 0s` → `wait` blocks until delivery or crash
//! - `linger = 0s` → a finished worker retires right after dispatch (no fast path window)

use std::time::Duration;

/// Configuration for one coalescer instance.
///
/// ## Field semantics
/// - `default_timeout`: Await deadline when neither `wait` nor the request options set one (`0s` = none)
/// - `linger`: How long a successful terminal value stays visible to late joiners
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct CoalescerConfig {
    /// Fallback await deadline.
    pub default_timeout: Duration,

    /// Window after a successful dispatch during which late joiners take the fast path.
    ///
    /// The window also closes early the first time a late joiner reads the cached value.
    /// Failures never linger.
    pub linger: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl CoalescerConfig {
    /// Returns the fallback await deadline as an `Option`.
    #[inline]
    pub fn await_timeout(&self) -> Option<Duration> {
        if self.default_timeout == Duration::ZERO {
            None
        } else {
            Some(self.default_timeout)
        }
    }

    /// Returns the linger window as an `Option`.
    #[inline]
    pub fn linger_window(&self) -> Option<Duration> {
        if self.linger == Duration::ZERO {
            None
        } else {
            Some(self.linger)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for CoalescerConfig {
    /// Default configuration:
    ///
    /// - `default_timeout = 5s`
    /// - `linger = 1s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
            linger: Duration::from_secs(1),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sentinels_map_to_none() {
        let cfg = CoalescerConfig {
            default_timeout: Duration::ZERO,
            linger: Duration::ZERO,
            bus_capacity: 0,
        };
        assert_eq!(cfg.await_timeout(), None);
        assert_eq!(cfg.linger_window(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn defaults_keep_a_fast_path_window() {
        let cfg = CoalescerConfig::default();
        assert_eq!(cfg.await_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(cfg.linger_window(), Some(Duration::from_secs(1)));
    }
}
