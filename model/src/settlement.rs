use crate::account::AccountId;
use crate::trade::TradeId;
use chrono::{Days, NaiveDate, Weekday};
use rust_decimal::Decimal;
use std::fmt::{self, Display, Formatter};

/// Store-assigned settlement row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SettlementRowId(pub i64);

impl Display for SettlementRowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SettlementRowId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A T+N settlement row (spec §3, §4.4 gate 3).
///
/// `amount` is signed: negative for a buy's cash outflow, positive for a
/// sell's proceeds. Non-goal: holiday-aware settlement calendars — only
/// weekends are skipped when computing `settlement_date`.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRow {
    /// Store-assigned identifier.
    pub id: SettlementRowId,
    /// Owning account.
    pub account_id: AccountId,
    /// The trade this settlement row derives from.
    pub trade_id: TradeId,
    /// Signed cash effect: negative buy outflow, positive sell proceeds.
    pub amount: Decimal,
    /// Date on which this amount becomes usable cash.
    pub settlement_date: NaiveDate,
    /// Whether `settlement_date` has passed and the amount has settled.
    pub settled: bool,
}

/// Adds `business_days` business days (Mon-Fri) to `date`, skipping weekends.
///
/// This is the T+N calculation of spec §3/§9: holidays are explicitly
/// deferred (Non-goals), so only Saturday/Sunday are skipped.
pub fn add_business_days(date: NaiveDate, business_days: u32) -> NaiveDate {
    let mut remaining = business_days;
    let mut current = date;
    while remaining > 0 {
        current = match current.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => return current,
        };
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            remaining = remaining.saturating_sub(1);
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friday_plus_two_business_days_is_tuesday() {
        // 2026-07-24 is a Friday.
        let friday = NaiveDate::from_ymd_opt(2026, 7, 24).expect("valid date");
        let settle = add_business_days(friday, 2);
        assert_eq!(settle, NaiveDate::from_ymd_opt(2026, 7, 28).expect("valid date"));
        assert_eq!(settle.weekday(), Weekday::Tue);
    }

    #[test]
    fn midweek_plus_two_business_days_stays_midweek() {
        // 2026-07-28 is a Tuesday.
        let tuesday = NaiveDate::from_ymd_opt(2026, 7, 28).expect("valid date");
        let settle = add_business_days(tuesday, 2);
        assert_eq!(settle, NaiveDate::from_ymd_opt(2026, 7, 30).expect("valid date"));
    }
}
