use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::{self, Display, Formatter};

/// Supported bar timeframes for market data retrieval (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarTimeframe {
    /// One-minute bars.
    OneMinute,
    /// Five-minute bars.
    FiveMinute,
    /// Fifteen-minute bars.
    FifteenMinute,
    /// One-hour bars.
    OneHour,
    /// One-day bars.
    OneDay,
}

impl Display for BarTimeframe {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BarTimeframe::OneMinute => write!(f, "1m"),
            BarTimeframe::FiveMinute => write!(f, "5m"),
            BarTimeframe::FifteenMinute => write!(f, "15m"),
            BarTimeframe::OneHour => write!(f, "1h"),
            BarTimeframe::OneDay => write!(f, "1d"),
        }
    }
}

/// OHLCV bar for a symbol (spec §4.2 / §3).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    /// Bar timestamp (start of the bar, UTC).
    pub t: DateTime<Utc>,
    /// Open price.
    pub o: Decimal,
    /// High price.
    pub h: Decimal,
    /// Low price.
    pub l: Decimal,
    /// Close price.
    pub c: Decimal,
    /// Volume.
    pub v: u64,
}
