//! Typed configuration for the scheduler (spec §6 `scheduler.*`).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Every option in spec.md §6's `scheduler.*` table; defaults match the
/// documented defaults.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Auto-start the scheduler at boot.
    pub enabled: bool,
    /// Sleep between evaluation ticks (default 60s).
    pub evaluation_interval: Duration,
    /// Sleep between exit checks (default 30s).
    pub exit_check_interval: Duration,
    /// Minimum signal confidence the scheduler acts on.
    pub min_confidence: Decimal,
    /// Maximum number of simultaneously open positions.
    pub max_concurrent_trades: usize,
    /// Skip a tick if the broker is disconnected.
    pub require_broker_connection: bool,
    /// Skip a tick outside the 09:30-16:00 ET weekday session.
    pub market_hours_only: bool,
    /// How many bars to request per evaluation (`N` in spec §4.6 step 2).
    pub bars_per_evaluation: usize,
    /// Broker events drained per tick after placing orders, bounding how
    /// much fill-handling work one tick can absorb.
    pub max_events_per_tick: usize,
    /// Consecutive same-kind failures before a loop pauses itself for 60s
    /// (spec §4.6 "Error handling").
    pub consecutive_failure_pause_threshold: u32,
    /// How long a loop pauses itself after hitting the threshold above.
    pub consecutive_failure_pause: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            enabled: false,
            evaluation_interval: Duration::from_secs(60),
            exit_check_interval: Duration::from_secs(30),
            min_confidence: dec!(0.5),
            max_concurrent_trades: 5,
            require_broker_connection: true,
            market_hours_only: true,
            bars_per_evaluation: 50,
            max_events_per_tick: 64,
            consecutive_failure_pause_threshold: 3,
            consecutive_failure_pause: Duration::from_secs(60),
        }
    }
}
