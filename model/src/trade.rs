use crate::account::AccountId;
use crate::ids::BrokerOrderId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::{self, Display, Formatter};

/// Store-assigned trade identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeId(pub i64);

impl Display for TradeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TradeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Side of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    /// Opens or adds to a long position.
    Buy,
    /// Closes or opens a short position.
    Sell,
}

impl Display for TradeSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// Trade entity (spec §3): an executed fill. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    /// Store-assigned identifier.
    pub id: TradeId,
    /// Owning account.
    pub account_id: AccountId,
    /// Ticker symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: TradeSide,
    /// Filled quantity (always positive; `side` carries direction).
    pub quantity: i64,
    /// Fill price.
    pub price: Decimal,
    /// Broker-reported execution timestamp (UTC).
    pub executed_at: DateTime<Utc>,
    /// Broker-native order id this fill belongs to.
    pub broker_order_id: BrokerOrderId,
    /// Strategy that produced the originating signal, if any (manual/admin trades have none).
    pub strategy_id: Option<String>,
    /// Realized P&L attributable to this fill, set for sells that close some or all of a position.
    pub realized_pnl: Option<Decimal>,
}

impl Trade {
    /// Notional value of the fill (`quantity * price`), always non-negative.
    pub fn notional(&self) -> Decimal {
        Decimal::from(self.quantity).checked_mul(self.price).unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn notional_is_quantity_times_price() {
        let trade = Trade {
            id: TradeId(1),
            account_id: AccountId(1),
            symbol: "AAPL".to_string(),
            side: TradeSide::Buy,
            quantity: 5,
            price: dec!(150),
            executed_at: Utc::now(),
            broker_order_id: BrokerOrderId("o-1".to_string()),
            strategy_id: None,
            realized_pnl: None,
        };
        assert_eq!(trade.notional(), dec!(750));
    }
}
