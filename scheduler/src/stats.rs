//! Running counters for the scheduler (spec §4.6 "Statistics") plus the
//! consecutive-same-kind-failure tracker that backs the 60s self-pause rule.

use chrono::{DateTime, Utc};
use model::ErrorKind;
use std::time::Instant;

/// Snapshot of the scheduler's running counters, returned by `status()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerStats {
    /// Evaluation ticks that ran to completion (precondition checks passed).
    pub evaluations_run: u64,
    /// Non-`hold` signals produced across all strategies.
    pub signals_generated: u64,
    /// Orders that were placed successfully.
    pub trades_executed: u64,
    /// Signals the risk engine blocked.
    pub trades_rejected: u64,
    /// Errors recorded across evaluation and exit ticks.
    pub errors: u64,
    /// Open positions currently tracked by the exit loop.
    pub monitored_positions: u64,
    /// Timestamp of the most recent evaluation tick.
    pub last_evaluation: Option<DateTime<Utc>>,
    /// Timestamp of the most recent executed trade.
    pub last_trade: Option<DateTime<Utc>>,
    /// Seconds since `start()`, `None` if never started.
    pub uptime_seconds: Option<u64>,
}

impl Default for SchedulerStats {
    fn default() -> Self {
        SchedulerStats {
            evaluations_run: 0,
            signals_generated: 0,
            trades_executed: 0,
            trades_rejected: 0,
            errors: 0,
            monitored_positions: 0,
            last_evaluation: None,
            last_trade: None,
            uptime_seconds: None,
        }
    }
}

/// Tracks consecutive failures of the same [`ErrorKind`] so a loop can pause
/// itself for 60s after three in a row (spec §4.6), resetting on any
/// success or on a different kind of failure.
#[derive(Debug, Default)]
pub struct ConsecutiveFailureTracker {
    kind: Option<ErrorKind>,
    count: u32,
}

impl ConsecutiveFailureTracker {
    /// Records a failure of `kind`, returning the new consecutive streak length.
    pub fn record_failure(&mut self, kind: ErrorKind) -> u32 {
        if self.kind == Some(kind) {
            self.count += 1;
        } else {
            self.kind = Some(kind);
            self.count = 1;
        }
        self.count
    }

    /// Clears the streak after a successful tick.
    pub fn record_success(&mut self) {
        self.kind = None;
        self.count = 0;
    }

    /// The current consecutive-failure streak length.
    pub fn current_streak(&self) -> u32 {
        self.count
    }
}

/// When the scheduler last transitioned into `Running`, for uptime reporting.
#[derive(Debug, Default)]
pub struct UptimeClock {
    started_at: Option<Instant>,
}

impl UptimeClock {
    /// Marks "now" as the start of an uptime window.
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Clears the window (the scheduler has stopped).
    pub fn stop(&mut self) {
        self.started_at = None;
    }

    /// Seconds elapsed since `start()`, if running.
    pub fn uptime_seconds(&self) -> Option<u64> {
        self.started_at.map(|at| at.elapsed().as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_same_kind_failures_hits_the_threshold() {
        let mut tracker = ConsecutiveFailureTracker::default();
        assert_eq!(tracker.record_failure(ErrorKind::Unavailable), 1);
        assert_eq!(tracker.record_failure(ErrorKind::Unavailable), 2);
        assert_eq!(tracker.record_failure(ErrorKind::Unavailable), 3);
    }

    #[test]
    fn a_different_failure_kind_resets_the_streak() {
        let mut tracker = ConsecutiveFailureTracker::default();
        tracker.record_failure(ErrorKind::Unavailable);
        tracker.record_failure(ErrorKind::Unavailable);
        assert_eq!(tracker.record_failure(ErrorKind::Timeout), 1);
    }

    #[test]
    fn success_resets_the_streak() {
        let mut tracker = ConsecutiveFailureTracker::default();
        tracker.record_failure(ErrorKind::Unavailable);
        tracker.record_success();
        assert_eq!(tracker.record_failure(ErrorKind::Unavailable), 1);
    }
}
