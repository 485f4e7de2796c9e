use crate::account::AccountId;
use crate::trade::TradeId;
use chrono::NaiveDate;
use std::fmt::{self, Display, Formatter};

/// Store-assigned day-trade identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayTradeId(pub i64);

impl Display for DayTradeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DayTradeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A recorded day-trade: opening and closing the same symbol within one UTC
/// trading date (spec §3, §4.4 gate 2 / PDT).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayTrade {
    /// Store-assigned identifier.
    pub id: DayTradeId,
    /// Owning account.
    pub account_id: AccountId,
    /// Ticker symbol.
    pub symbol: String,
    /// The trade that opened the position.
    pub opened_trade_id: TradeId,
    /// The trade that closed the position.
    pub closed_trade_id: TradeId,
    /// UTC trading date on which both legs occurred.
    pub executed_date: NaiveDate,
}
