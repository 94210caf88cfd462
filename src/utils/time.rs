//! Clock abstraction used by the manager for stream timing
//!
//! The annotation calibration window and stream start timestamps go through a
//! [`TimeProvider`] so tests can step time deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::config::constants::timing::NANOSECONDS_PER_SECOND;

/// Time provider trait for dependency injection and testing
pub trait TimeProvider: Send + Sync {
    /// Current time in nanoseconds. Only differences between readings are meaningful.
    fn now_nanos(&self) -> u64;

    /// Current time in milliseconds
    fn now_millis(&self) -> u64 {
        self.now_nanos() / 1_000_000
    }
}

/// Monotonic clock anchored at construction time
pub struct MonotonicTimeProvider {
    origin: Instant,
}

impl MonotonicTimeProvider {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for MonotonicTimeProvider {
    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Mock time provider for deterministic testing
pub struct MockTimeProvider {
    current_time: AtomicU64,
}

impl MockTimeProvider {
    pub fn new(initial_time_nanos: u64) -> Self {
        Self {
            current_time: AtomicU64::new(initial_time_nanos),
        }
    }

    pub fn advance_by(&self, nanos: u64) {
        self.current_time.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn advance_millis(&self, millis: u64) {
        self.advance_by(millis * 1_000_000);
    }

    pub fn set_time(&self, nanos: u64) {
        self.current_time.store(nanos, Ordering::Relaxed);
    }
}

impl TimeProvider for MockTimeProvider {
    fn now_nanos(&self) -> u64 {
        self.current_time.load(Ordering::Relaxed)
    }
}

/// Period of one sample at `rate_hz`, in nanoseconds
pub fn sample_period_nanos(rate_hz: u32) -> u64 {
    if rate_hz == 0 {
        return 0;
    }
    NANOSECONDS_PER_SECOND / rate_hz as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_time_advances() {
        let clock = MockTimeProvider::new(1_000);
        assert_eq!(clock.now_nanos(), 1_000);
        clock.advance_millis(2);
        assert_eq!(clock.now_nanos(), 2_001_000);
        assert_eq!(clock.now_millis(), 2);
        clock.set_time(0);
        assert_eq!(clock.now_nanos(), 0);
    }

    #[test]
    fn test_monotonic_never_goes_back() {
        let clock = MonotonicTimeProvider::new();
        let a = clock.now_nanos();
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(clock.now_nanos() > a);
    }

    #[test]
    fn test_sample_period() {
        assert_eq!(sample_period_nanos(250), 4_000_000);
        assert_eq!(sample_period_nanos(16_000), 62_500);
        assert_eq!(sample_period_nanos(0), 0);
    }
}
