use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt::{self, Display, Formatter};

/// Store-assigned account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub i64);

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Operational mode an account is in, recomputed on each balance refresh.
///
/// An account is in `Cash` mode whenever `balance < cash_account_threshold`
/// (default $25,000, spec §4.4 gate 1). Cash accounts are subject to PDT,
/// settlement/GFV, and trade-frequency gates; margin accounts are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountMode {
    /// Below the cash-account threshold: PDT/settlement/GFV/frequency gates apply.
    Cash,
    /// At or above the threshold: those gates are bypassed.
    Margin,
}

impl Display for AccountMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AccountMode::Cash => write!(f, "cash"),
            AccountMode::Margin => write!(f, "margin"),
        }
    }
}

/// Account entity (spec §3).
///
/// Balance and cash are refreshed from the broker (gate 1 of §4.4) and
/// cached with a short TTL by the risk engine; this struct is the
/// snapshot as currently known to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// Store-assigned identifier.
    pub id: AccountId,
    /// Net liquidation balance, as last refreshed from the broker.
    pub balance: Decimal,
    /// Total cash, as last refreshed from the broker.
    pub cash: Decimal,
    /// ISO 4217 currency code. Non-goal: multi-currency; always the account's home currency.
    pub currency: String,
    /// Cash vs. margin classification, recomputed on refresh.
    pub mode: AccountMode,
    /// When this snapshot was last refreshed from the broker.
    pub balance_refreshed_at: DateTime<Utc>,
    /// When the account row was created.
    pub created_at: DateTime<Utc>,
}

/// Default threshold below which an account is classified as a cash account.
pub const DEFAULT_CASH_ACCOUNT_THRESHOLD: Decimal = dec!(25000);

impl Account {
    /// Classifies `balance` against `threshold` per spec §4.4 gate 1.
    ///
    /// Boundary behavior: `balance == threshold` is margin mode (the gate
    /// only applies strictly below the threshold).
    pub fn classify(balance: Decimal, threshold: Decimal) -> AccountMode {
        if balance < threshold {
            AccountMode::Cash
        } else {
            AccountMode::Margin
        }
    }

    /// Returns true if this account is currently subject to cash-account gates.
    pub fn is_cash_account(&self) -> bool {
        matches!(self.mode, AccountMode::Cash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_below_threshold_is_cash_mode() {
        assert_eq!(
            Account::classify(dec!(24999.99), DEFAULT_CASH_ACCOUNT_THRESHOLD),
            AccountMode::Cash
        );
    }

    #[test]
    fn balance_equal_to_threshold_is_margin_mode() {
        assert_eq!(
            Account::classify(DEFAULT_CASH_ACCOUNT_THRESHOLD, DEFAULT_CASH_ACCOUNT_THRESHOLD),
            AccountMode::Margin
        );
    }

    #[test]
    fn balance_above_threshold_is_margin_mode() {
        assert_eq!(
            Account::classify(dec!(100000), DEFAULT_CASH_ACCOUNT_THRESHOLD),
            AccountMode::Margin
        );
    }
}
