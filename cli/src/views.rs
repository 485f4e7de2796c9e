//! Renders a [`DaemonResponse`] for the terminal, the same
//! one-struct-per-view-plus-`tabled::Table` idiom the teacher's `views`
//! module uses for accounts and trades, applied here to the single
//! `scheduler status` table this admin surface exposes.

use crate::ipc::{DaemonResponse, SchedulerStatusPayload};
use chrono::{TimeZone, Utc};
use tabled::settings::style::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct StatusRow {
    state: String,
    evaluations_run: u64,
    signals_generated: u64,
    trades_executed: u64,
    trades_rejected: u64,
    errors: u64,
    monitored_positions: u64,
    uptime_seconds: u64,
    last_evaluation: String,
    last_trade: String,
}

impl From<&SchedulerStatusPayload> for StatusRow {
    fn from(payload: &SchedulerStatusPayload) -> Self {
        StatusRow {
            state: payload.state.clone(),
            evaluations_run: payload.evaluations_run,
            signals_generated: payload.signals_generated,
            trades_executed: payload.trades_executed,
            trades_rejected: payload.trades_rejected,
            errors: payload.errors,
            monitored_positions: payload.monitored_positions,
            uptime_seconds: payload.uptime_seconds,
            last_evaluation: format_timestamp(payload.last_evaluation),
            last_trade: format_timestamp(payload.last_trade),
        }
    }
}

fn format_timestamp(epoch_seconds: Option<i64>) -> String {
    match epoch_seconds {
        Some(secs) => match Utc.timestamp_opt(secs, 0).single() {
            Some(at) => at.to_rfc3339(),
            None => "-".to_string(),
        },
        None => "-".to_string(),
    }
}

/// Prints the daemon's response to a `DaemonCommand` in a human-readable form.
pub fn print_response(response: &DaemonResponse) {
    match response {
        DaemonResponse::Ok => println!("ok"),
        DaemonResponse::SchedulerStatus(status) => {
            let mut table = Table::new([StatusRow::from(status)]);
            table.with(Style::modern());
            println!("{table}");
        }
        DaemonResponse::BrokerStatus(connected) => {
            println!("broker: {}", if *connected { "connected" } else { "disconnected" });
        }
        DaemonResponse::SyncNow(outcome) => println!("sync: {outcome}"),
        DaemonResponse::Error(message) => eprintln!("error: {message}"),
    }
}
