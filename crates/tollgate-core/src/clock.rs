//! Time sources.
//!
//! Token expiry and rate-limit windows read time through [`Clock`] so tests
//! can move time deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time as a duration since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time since the Unix epoch.
    fn now(&self) -> Duration;

    /// Current time in whole seconds.
    fn now_secs(&self) -> u64 {
        self.now().as_secs()
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// Manually driven clock with millisecond resolution.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at the given time.
    pub fn new(start: Duration) -> Self {
        Self {
            millis: AtomicU64::new(start.as_millis() as u64),
        }
    }

    /// Create a clock frozen at the current system time.
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, to: Duration) {
        self.millis.store(to.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Shared system clock.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(Duration::from_secs(100));
        assert_eq!(clock.now_secs(), 100);

        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now(), Duration::from_millis(101_500));
        assert_eq!(clock.now_secs(), 101);

        clock.set(Duration::from_secs(5));
        assert_eq!(clock.now_secs(), 5);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now_secs() > 1_600_000_000);
    }
}
