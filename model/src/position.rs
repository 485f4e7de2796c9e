use crate::account::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::{self, Display, Formatter};

/// Store-assigned position identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionId(pub i64);

impl Display for PositionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PositionId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a position (spec §3 invariant: `status = closed ⇔
/// quantity = 0 ∧ closed_at ≠ null`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    /// Quantity is non-zero; this is the single open position for `(account_id, symbol)`.
    Open,
    /// Quantity dropped to zero; `closed_at` and `realized_pnl` are set.
    Closed,
}

impl Display for PositionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "open"),
            PositionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Position entity (spec §3).
///
/// The store's single source of truth about "what we hold" between
/// broker syncs. `quantity` is signed: positive for a long position,
/// negative for a short position.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// Store-assigned identifier.
    pub id: PositionId,
    /// Owning account.
    pub account_id: AccountId,
    /// Ticker symbol.
    pub symbol: String,
    /// Signed share quantity. Zero only transiently during the close transition.
    pub quantity: i64,
    /// Volume-weighted average entry price across all increases.
    pub average_price: Decimal,
    /// Latest known market price, refreshed on each sync.
    pub current_price: Decimal,
    /// `(current_price - average_price) * quantity`, refreshed on each sync.
    pub unrealized_pnl: Decimal,
    /// Unrealized P&L as a percentage of cost basis.
    pub unrealized_pnl_pct: Decimal,
    /// Open or closed.
    pub status: PositionStatus,
    /// When the position was first observed as open.
    pub opened_at: DateTime<Utc>,
    /// When the position transitioned to closed, if it has.
    pub closed_at: Option<DateTime<Utc>>,
    /// When this row was last reconciled against the broker.
    pub last_synced_at: DateTime<Utc>,
    /// Realized P&L, set at the close transition: `(exit_price - average_price) * original_qty`.
    pub realized_pnl: Option<Decimal>,
}

impl Position {
    /// True if this position satisfies the closed-iff-zero invariant.
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            PositionStatus::Closed => self.quantity == 0 && self.closed_at.is_some(),
            PositionStatus::Open => self.quantity != 0,
        }
    }

    /// Recomputes `unrealized_pnl` and `unrealized_pnl_pct` from `current_price`.
    ///
    /// Uses checked arithmetic throughout; a zero cost basis yields a 0%
    /// return rather than a division error, matching how the risk engine's
    /// sizing calculators fail soft on degenerate inputs.
    pub fn refresh_unrealized(&mut self) {
        let qty = Decimal::from(self.quantity);
        let price_diff = self.current_price.checked_sub(self.average_price).unwrap_or(Decimal::ZERO);
        self.unrealized_pnl = price_diff.checked_mul(qty).unwrap_or(Decimal::ZERO);

        let cost_basis = self.average_price.checked_mul(qty.abs()).unwrap_or(Decimal::ZERO);
        self.unrealized_pnl_pct = if cost_basis.is_zero() {
            Decimal::ZERO
        } else {
            self.unrealized_pnl
                .checked_div(cost_basis)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .unwrap_or(Decimal::ZERO)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open_position() -> Position {
        Position {
            id: PositionId(1),
            account_id: AccountId(1),
            symbol: "AAPL".to_string(),
            quantity: 10,
            average_price: dec!(150),
            current_price: dec!(150),
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            last_synced_at: Utc::now(),
            realized_pnl: None,
        }
    }

    #[test]
    fn open_with_nonzero_quantity_satisfies_invariant() {
        assert!(open_position().invariant_holds());
    }

    #[test]
    fn open_with_zero_quantity_violates_invariant() {
        let mut p = open_position();
        p.quantity = 0;
        assert!(!p.invariant_holds());
    }

    #[test]
    fn closed_without_closed_at_violates_invariant() {
        let mut p = open_position();
        p.status = PositionStatus::Closed;
        p.quantity = 0;
        p.closed_at = None;
        assert!(!p.invariant_holds());
    }

    #[test]
    fn refresh_unrealized_computes_pct_of_cost_basis() {
        let mut p = open_position();
        p.current_price = dec!(165);
        p.refresh_unrealized();
        assert_eq!(p.unrealized_pnl, dec!(150));
        assert_eq!(p.unrealized_pnl_pct, dec!(10));
    }

    #[test]
    fn refresh_unrealized_short_position() {
        let mut p = open_position();
        p.quantity = -10;
        p.current_price = dec!(140);
        p.refresh_unrealized();
        // Short gains as price falls: (140-150)*-10 = 100
        assert_eq!(p.unrealized_pnl, dec!(100));
    }
}
