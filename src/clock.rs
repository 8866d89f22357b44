//! Time sources the cache reasons about: a monotonic wall-clock microsecond
//! counter (process-relative, matching `os_now_microseconds`) and the
//! externally-ticked "user clock" (one tick per UI frame, typically).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Microseconds elapsed since this process first called [`now_us`].
#[must_use]
pub fn now_us() -> u64 {
    let start = PROCESS_START.get_or_init(Instant::now);
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Sentinel deadline meaning "block forever" for ring enqueue/dequeue.
pub const DEADLINE_FOREVER: u64 = u64::MAX;

/// Externally-ticked logical clock (e.g. one tick per rendered UI frame).
/// Used alongside [`now_us`] in eviction decisions so that a paused debugger
/// frontend doesn't evict results just because wall-clock time passed.
#[derive(Debug, Default)]
pub struct UserClock(AtomicU64);

impl UserClock {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[must_use]
    pub fn idx(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_clock_ticks_monotonically() {
        let clock = UserClock::new();
        assert_eq!(clock.idx(), 0);
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.idx(), 2);
    }

    #[test]
    fn now_us_is_monotonic_nondecreasing() {
        let a = now_us();
        let b = now_us();
        assert!(b >= a);
    }
}
