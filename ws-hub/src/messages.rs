//! Outbound WebSocket message schemas (spec §4.7, bit-exact fields).
//!
//! Every message carries a `type` discriminant as a JSON string literal.
//! Clients are expected to ignore unknown extra fields, so these structs
//! only need to emit the fields spec §4.7 documents, not suppress any.

use chrono::{DateTime, Utc};
use model::{Signal, SignalKind, Trade, TradeSide};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// One symbol's row inside a `price_update` message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SymbolPrice {
    /// Last trade price.
    pub price: Decimal,
    /// Absolute change since the previous broadcast.
    pub change: Decimal,
    /// Percentage change since the previous broadcast.
    pub change_pct: Decimal,
    /// Session volume, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
    /// Session high, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,
    /// Session low, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,
    /// Session open, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    /// Previous close, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<Decimal>,
}

/// `price_update`: batches every symbol whose price changed since the last poll (spec §4.7).
#[derive(Debug, Clone, Serialize)]
pub struct PriceUpdateMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Per-symbol price rows, keyed by ticker.
    pub symbols: HashMap<String, SymbolPrice>,
    /// When this batch was produced.
    pub timestamp: DateTime<Utc>,
}

impl PriceUpdateMessage {
    /// Builds a `price_update` batch for the given changed symbols.
    pub fn new(symbols: HashMap<String, SymbolPrice>) -> Self {
        PriceUpdateMessage {
            kind: "price_update",
            symbols,
            timestamp: Utc::now(),
        }
    }
}

/// `signal`: a strategy-produced recommendation (spec §4.7).
#[derive(Debug, Clone, Serialize)]
pub struct SignalMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    /// `buy` / `sell` / `hold` / `exit`.
    pub signal_type: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Reference price the signal was generated against.
    pub price: Decimal,
    /// Suggested quantity, if the strategy supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    /// Strategy-local confidence in `[0, 1]`.
    pub confidence: Decimal,
    /// When the signal was generated.
    pub timestamp: DateTime<Utc>,
}

impl From<&Signal> for SignalMessage {
    fn from(signal: &Signal) -> Self {
        SignalMessage {
            kind: "signal",
            signal_type: signal_type_name(signal.kind).to_string(),
            symbol: signal.symbol.clone(),
            price: signal.price,
            quantity: signal.quantity,
            confidence: signal.confidence,
            timestamp: signal.generated_at,
        }
    }
}

fn signal_type_name(kind: SignalKind) -> &'static str {
    match kind {
        SignalKind::Buy => "buy",
        SignalKind::Sell => "sell",
        SignalKind::Hold => "hold",
        SignalKind::Exit => "exit",
    }
}

/// `trade_executed`: one fill (spec §4.7).
#[derive(Debug, Clone, Serialize)]
pub struct TradeExecutedMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Ticker symbol.
    pub symbol: String,
    /// `buy` / `sell`.
    pub side: String,
    /// Filled quantity.
    pub quantity: i64,
    /// Fill price.
    pub price: Decimal,
    /// Broker-reported execution timestamp.
    pub timestamp: DateTime<Utc>,
}

impl From<&Trade> for TradeExecutedMessage {
    fn from(trade: &Trade) -> Self {
        TradeExecutedMessage {
            kind: "trade_executed",
            symbol: trade.symbol.clone(),
            side: match trade.side {
                TradeSide::Buy => "buy".to_string(),
                TradeSide::Sell => "sell".to_string(),
            },
            quantity: trade.quantity,
            price: trade.price,
            timestamp: trade.executed_at,
        }
    }
}

/// One symbol's row inside a `portfolio_update` message's `data.positions` map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortfolioPosition {
    /// Signed share quantity.
    pub quantity: i64,
    /// Volume-weighted average entry price.
    pub average_price: Decimal,
    /// Latest known market price.
    pub current_price: Decimal,
    /// Unrealized P&L in account currency.
    pub unrealized_pnl: Decimal,
    /// Unrealized P&L as a percentage of cost basis.
    pub unrealized_pnl_pct: Decimal,
}

/// Body of a `portfolio_update` message's `data` field.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioData {
    /// Open positions keyed by symbol.
    pub positions: HashMap<String, PortfolioPosition>,
    /// Sum of `unrealized_pnl` across every open position.
    pub total_pnl: Decimal,
    /// Number of open positions.
    pub position_count: usize,
}

/// `portfolio_update`: a snapshot of open positions and aggregate P&L (spec §4.7).
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioUpdateMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Always `"portfolio"`.
    pub channel: &'static str,
    /// When this snapshot was produced.
    pub timestamp: DateTime<Utc>,
    /// Position and P&L data.
    pub data: PortfolioData,
}

impl PortfolioUpdateMessage {
    /// Builds a `portfolio_update` snapshot from a set of open positions.
    pub fn new(positions: &[model::Position]) -> Self {
        let mut total_pnl = Decimal::ZERO;
        let mut rows = HashMap::with_capacity(positions.len());
        for position in positions {
            total_pnl = total_pnl.checked_add(position.unrealized_pnl).unwrap_or(total_pnl);
            rows.insert(
                position.symbol.clone(),
                PortfolioPosition {
                    quantity: position.quantity,
                    average_price: position.average_price,
                    current_price: position.current_price,
                    unrealized_pnl: position.unrealized_pnl,
                    unrealized_pnl_pct: position.unrealized_pnl_pct,
                },
            );
        }
        PortfolioUpdateMessage {
            kind: "portfolio_update",
            channel: "portfolio",
            timestamp: Utc::now(),
            data: PortfolioData {
                position_count: rows.len(),
                positions: rows,
                total_pnl,
            },
        }
    }
}

/// `pong`: keep-alive reply to a client `ping` (spec §4.7).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PongMessage {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Default for PongMessage {
    fn default() -> Self {
        PongMessage { kind: "pong" }
    }
}

/// `error`: a per-request client error, never used for internal failures (spec §7).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Short machine-readable error description.
    pub error: String,
    /// When the error was produced.
    pub timestamp: DateTime<Utc>,
}

impl ErrorMessage {
    /// Builds an `error` frame for a bad client request (e.g. malformed JSON).
    pub fn new(error: impl Into<String>) -> Self {
        ErrorMessage {
            kind: "error",
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signal_message_carries_literal_type_discriminant() {
        let signal = Signal::hold("AAPL", "s1", dec!(150));
        let message = SignalMessage::from(&signal);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "signal");
        assert_eq!(json["signal_type"], "hold");
    }

    #[test]
    fn portfolio_update_sums_unrealized_pnl_and_omits_closed_handling() {
        use chrono::Utc;
        use model::{AccountId, Position, PositionId, PositionStatus};

        let positions = vec![
            Position {
                id: PositionId(1),
                account_id: AccountId(1),
                symbol: "AAPL".to_string(),
                quantity: 10,
                average_price: dec!(150),
                current_price: dec!(155),
                unrealized_pnl: dec!(50),
                unrealized_pnl_pct: dec!(3.33),
                status: PositionStatus::Open,
                opened_at: Utc::now(),
                closed_at: None,
                last_synced_at: Utc::now(),
                realized_pnl: None,
            },
            Position {
                id: PositionId(2),
                account_id: AccountId(1),
                symbol: "MSFT".to_string(),
                quantity: 5,
                average_price: dec!(300),
                current_price: dec!(295),
                unrealized_pnl: dec!(-25),
                unrealized_pnl_pct: dec!(-1.67),
                status: PositionStatus::Open,
                opened_at: Utc::now(),
                closed_at: None,
                last_synced_at: Utc::now(),
                realized_pnl: None,
            },
        ];

        let message = PortfolioUpdateMessage::new(&positions);
        assert_eq!(message.data.total_pnl, dec!(25));
        assert_eq!(message.data.position_count, 2);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["channel"], "portfolio");
        assert_eq!(json["type"], "portfolio_update");
    }

    #[test]
    fn pong_message_has_no_extra_fields() {
        let json = serde_json::to_value(PongMessage::default()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "pong"}));
    }
}
