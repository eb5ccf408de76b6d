//! Sliding-window limit on calls to the payment service.
//!
//! The window counts verification calls regardless of which transaction id they check,
//! so garbage-but-well-formed ids cannot be used to hammer the payment service.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of verification calls issued within the trailing window.
#[derive(Debug)]
pub struct RateWindow {
    limit: usize,
    window: Duration,
    attempts: VecDeque<Instant>,
}

impl RateWindow {
    pub const DEFAULT_LIMIT: usize = 30;
    pub const WINDOW: Duration = Duration::from_secs(60);

    pub fn new(limit: usize) -> Self {
        Self::with_window(limit, Self::WINDOW)
    }

    pub fn with_window(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            attempts: VecDeque::with_capacity(limit.min(1024)),
        }
    }

    /// Records an attempt at `now` if the window has room.
    ///
    /// Returns `false`, recording nothing, when `limit` attempts already fall within the
    /// window ending at `now`. Attempts at least `window` old are pruned first.
    pub fn record_attempt(&mut self, now: Instant) -> bool {
        while let Some(oldest) = self.attempts.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
        if self.attempts.len() >= self.limit {
            return false;
        }
        self.attempts.push_back(now);
        true
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}
