//! Monotonic clock seam for the verification rate window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of "now" for time-dependent gate logic.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Shareable across tasks.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed_millis: AtomicU64,
}

impl ManualClock {
    /// Furthest the clock can be advanced, about a century.
    pub const MAX_OFFSET: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_millis: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward by `by`, saturating at [`ManualClock::MAX_OFFSET`].
    pub fn advance(&self, by: Duration) {
        let cap = Self::MAX_OFFSET.as_millis() as u64;
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let _ = self
            .elapsed_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |elapsed| {
                Some(elapsed.saturating_add(by).min(cap))
            });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let elapsed = Duration::from_millis(self.elapsed_millis.load(Ordering::SeqCst));
        self.origin.checked_add(elapsed).unwrap_or(self.origin)
    }
}
