//! Monotonic time source for the timer wheel.
//!
//! The core never reads wall-clock time directly; it goes through this
//! trait so tests can substitute an advance-on-demand double instead of
//! waiting on a real clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A monotonic non-decreasing millisecond clock.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since some arbitrary epoch fixed at
    /// clock creation. Must never decrease within a process.
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Wraps [`std::time::Instant`] to produce a monotonic millisecond clock.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Creates a new clock anchored at the current instant.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// A manually-advanced clock for deterministic tests.
///
/// Uses an atomic counter rather than a `Cell` so that `Arc<FakeClock>`
/// handles shared between a `Cache` and a test body stay `Send + Sync`,
/// letting a test drive time forward independently of the cache it backs.
///
/// # Examples
///
/// ```ignore
/// let clock = FakeClock::new();
/// clock.advance(150);
/// assert_eq!(clock.now_ms(), 150);
/// ```
#[derive(Debug, Default)]
pub struct FakeClock {
    millis: AtomicU64,
}

impl FakeClock {
    /// Creates a clock starting at `0` ms.
    #[must_use]
    pub fn new() -> Self {
        Self {
            millis: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute millisecond value.
    ///
    /// Panics in debug builds if `ms` would move the clock backwards,
    /// since a real monotonic clock never does.
    pub fn set(&self, ms: u64) {
        let current = self.millis.load(Ordering::SeqCst);
        debug_assert!(ms >= current, "FakeClock::set must not move time backwards");
        self.millis.store(ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_clock_advance() {
        let clock = FakeClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.advance(150);
        assert_eq!(clock.now_ms(), 150);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 200);
    }

    #[test]
    fn test_fake_clock_set() {
        let clock = FakeClock::new();
        clock.set(500);
        assert_eq!(clock.now_ms(), 500);
    }

    #[test]
    fn test_monotonic_clock_nondecreasing() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
