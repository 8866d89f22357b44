//! Tunable knobs for the cache's sizing and timing behavior, exposed so
//! tests can shrink the ring or shorten eviction windows without waiting on
//! real wall-clock thresholds.

use std::time::Duration;

/// Eviction/retry thresholds, paired wall-clock + user-clock.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub us: u64,
    pub user_clocks: u64,
}

#[derive(Debug, Clone)]
pub struct DasmCacheConfig {
    /// Number of slots in the striped table. Spec fixes this at 1024; kept
    /// configurable so tests can use a tiny table and still exercise
    /// collisions deterministically.
    pub slots: u64,
    /// Size of the request ring, in bytes.
    pub ring_size_bytes: usize,
    /// Number of parse worker threads.
    pub parse_thread_count: usize,
    /// Evictor/detector sweep interval.
    pub sweep_interval: Duration,
    pub evict_threshold: Thresholds,
    pub retry_threshold: Thresholds,
}

impl Default for DasmCacheConfig {
    fn default() -> Self {
        Self {
            slots: crate::table::SLOTS,
            ring_size_bytes: 64 * 1024,
            parse_thread_count: 1,
            sweep_interval: Duration::from_millis(100),
            evict_threshold: Thresholds { us: 10_000_000, user_clocks: 10 },
            retry_threshold: Thresholds { us: 1_000_000, user_clocks: 10 },
        }
    }
}
