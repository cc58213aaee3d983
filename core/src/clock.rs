//! Scan clock: owns the cycle counter and the tick schedule.

use crate::{config::TickPolicy, types::Cycle};
use std::time::{Duration, Instant};

/// Longest tick interval the loop accepts. Longer intervals are capped.
pub const MAX_TICK_INTERVAL: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone, PartialEq)]
pub struct ScanClock {
    pub current_cycle: Cycle,
    pub interval: Duration,
    pub policy: TickPolicy,
}

impl ScanClock {
    pub fn new(interval: Duration, policy: TickPolicy) -> Self {
        Self {
            current_cycle: 0,
            interval: interval.min(MAX_TICK_INTERVAL),
            policy,
        }
    }

    /// Advance one cycle. Returns the new cycle number.
    pub fn advance(&mut self) -> Cycle {
        self.current_cycle += 1;
        self.current_cycle
    }

    /// When the next scan should start, given when the last one started
    /// and finished.
    ///
    /// Under `FixedRate` an overrunning scan is followed immediately by the
    /// next one; missed ticks are dropped, never replayed in a burst.
    /// A deadline past what `Instant` can hold falls back to `finished`.
    pub fn next_scan_at(&self, started: Instant, finished: Instant) -> Instant {
        let next = match self.policy {
            TickPolicy::FixedRate => started.checked_add(self.interval),
            TickPolicy::FixedDelay => finished.checked_add(self.interval),
        };
        next.map_or(finished, |at| at.max(finished))
    }
}
