//! The reconciliation algorithm itself (spec §4.5 steps 3-6), kept free of
//! locking/debounce concerns so it can be unit-tested against a plain
//! `DatabaseFactory` + a list of broker positions without a real broker.

use chrono::Utc;
use model::{
    AccountId, BrokerPosition, DatabaseFactory, ErrorKind, Position, PositionStatus, RuntimeError,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

/// Counts and diagnostics from one [`reconcile`] pass, independent of the
/// locking/debounce wrapper in [`crate::service`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// New positions inserted because the broker reported a symbol the store had never seen.
    pub created: u32,
    /// Existing open positions whose qty/price/P&L were refreshed.
    pub updated: u32,
    /// Positions that transitioned to `closed` this pass.
    pub closed: u32,
    /// Open DB positions with no corresponding broker report (spec §4.5 step 5).
    pub missing_from_broker: Vec<String>,
    /// Partial closes this pass (spec §4.5 step 4 "track partial realized
    /// P&L on the related trade when matchable"). The caller is the one
    /// positioned to find "the related trade" (it owns the trade
    /// repository), so this carries the computed delta rather than writing
    /// it directly.
    pub partial_closes: Vec<PartialClose>,
}

/// One partial close observed during a [`reconcile`] pass: `closed_qty`
/// shares left the position at (approximately) `exit_price`, realizing
/// `realized_pnl` against the position's weighted-average cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialClose {
    /// Symbol whose open position shrank without closing.
    pub symbol: String,
    /// Shares that left the position this pass.
    pub closed_qty: i64,
    /// `(exit_price - average_price) * closed_qty`.
    pub realized_pnl: Decimal,
}

/// `(exit_price - average_price) * qty`: the realized P&L formula shared by
/// a full close ([`close_position`]) and a partial close
/// ([`merge_increase_or_refresh`]) (spec §3 "a sell trade may carry realized
/// P&L for the closed portion", spec §8 property 7's weighted-average
/// counterpart for the exit side).
pub fn realized_pnl_for_close(average_price: Decimal, exit_price: Decimal, qty: i64) -> Decimal {
    let price_diff = exit_price.checked_sub(average_price).unwrap_or(Decimal::ZERO);
    price_diff.checked_mul(Decimal::from(qty)).unwrap_or(Decimal::ZERO)
}

/// Performs steps 3-6 of spec §4.5 for `account_id`, given a snapshot of
/// `broker_positions` already fetched by the caller (the timeout-bounded
/// RPC lives in [`crate::service`], not here).
pub fn reconcile(
    db: &dyn DatabaseFactory,
    account_id: AccountId,
    broker_positions: &[BrokerPosition],
    mark_missing_as_closed: bool,
    calculate_realized_pnl: bool,
) -> Result<ReconcileOutcome, RuntimeError> {
    let now = Utc::now();
    let mut outcome = ReconcileOutcome::default();

    let broker_by_symbol: HashMap<&str, &BrokerPosition> =
        broker_positions.iter().map(|bp| (bp.symbol.as_str(), bp)).collect();

    let db_positions = db
        .positions()
        .list_open(account_id)
        .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
    let db_by_symbol: HashMap<&str, &Position> =
        db_positions.iter().map(|p| (p.symbol.as_str(), p)).collect();

    // Step 4: broker positions with non-zero qty are inserted or merged.
    for bp in broker_positions.iter().filter(|bp| bp.qty != 0) {
        match db_by_symbol.get(bp.symbol.as_str()) {
            None => {
                let mut position = Position {
                    id: model::PositionId(0),
                    account_id,
                    symbol: bp.symbol.clone(),
                    quantity: bp.qty,
                    average_price: bp.avg_price,
                    current_price: bp.market_price,
                    unrealized_pnl: Decimal::ZERO,
                    unrealized_pnl_pct: Decimal::ZERO,
                    status: PositionStatus::Open,
                    opened_at: now,
                    closed_at: None,
                    last_synced_at: now,
                    realized_pnl: None,
                };
                position.refresh_unrealized();
                db.positions()
                    .insert(&position)
                    .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
                outcome.created += 1;
            }
            Some(dp) => {
                let (mut updated, partial_close) = merge_increase_or_refresh(dp, bp);
                updated.last_synced_at = now;
                db.positions()
                    .update(&updated)
                    .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
                outcome.updated += 1;
                if let Some(partial_close) = partial_close {
                    outcome.partial_closes.push(partial_close);
                }
            }
        }
    }

    // Steps 5-6: every open DB position the broker didn't report with a
    // non-zero qty is either an explicit close, a candidate for
    // auto-close, or left open with a logged warning.
    for dp in &db_positions {
        match broker_by_symbol.get(dp.symbol.as_str()) {
            Some(bp) if bp.qty == 0 => {
                let closed = close_position(dp, bp.market_price, now, calculate_realized_pnl);
                db.positions()
                    .update(&closed)
                    .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
                outcome.closed += 1;
            }
            Some(_) => {
                // Already handled by the non-zero-qty pass above.
            }
            None => {
                warn!(symbol = %dp.symbol, account_id = %account_id, "position missing from broker report");
                outcome.missing_from_broker.push(dp.symbol.clone());
                if mark_missing_as_closed {
                    let closed = close_position(dp, dp.current_price, now, calculate_realized_pnl);
                    db.positions()
                        .update(&closed)
                        .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
                    outcome.closed += 1;
                }
            }
        }
    }

    Ok(outcome)
}

/// Merges one broker-reported position into its matching open DB position
/// (spec §4.5 step 4: weighted-average increase, partial-close update, or a
/// plain price/P&L refresh when quantity is unchanged). Returns the computed
/// [`PartialClose`] alongside the updated position when `bp.qty` shrank
/// without hitting zero, so the caller can attribute it to the related
/// trade.
fn merge_increase_or_refresh(dp: &Position, bp: &BrokerPosition) -> (Position, Option<PartialClose>) {
    let mut updated = dp.clone();
    let mut partial_close = None;

    let same_direction = dp.quantity.signum() == bp.qty.signum() || dp.quantity == 0;
    let increased = same_direction && bp.qty.abs() > dp.quantity.abs();
    let partially_closed = same_direction && bp.qty != 0 && bp.qty.abs() < dp.quantity.abs();

    if increased {
        let delta = bp.qty.saturating_sub(dp.quantity);
        let prior_notional = dp.average_price.checked_mul(Decimal::from(dp.quantity)).unwrap_or(Decimal::ZERO);
        let added_notional = bp.avg_price.checked_mul(Decimal::from(delta)).unwrap_or(Decimal::ZERO);
        let total_notional = prior_notional + added_notional;
        updated.average_price = if bp.qty != 0 {
            total_notional.checked_div(Decimal::from(bp.qty)).unwrap_or(dp.average_price)
        } else {
            dp.average_price
        };
    } else if partially_closed {
        // A partial close keeps the existing average_price: a sell doesn't
        // change the cost basis of what remains. The shares that left
        // realize P&L against that unchanged average_price at the broker's
        // reported market price.
        let closed_qty = dp.quantity.abs().saturating_sub(bp.qty.abs());
        partial_close = Some(PartialClose {
            symbol: dp.symbol.clone(),
            closed_qty,
            realized_pnl: realized_pnl_for_close(dp.average_price, bp.market_price, closed_qty),
        });
    }

    updated.quantity = bp.qty;
    updated.current_price = bp.market_price;
    updated.refresh_unrealized();
    (updated, partial_close)
}

/// Transitions a position to `closed` (spec §4.5 step 6, invariant in §8
/// property 2: `status = closed ⇔ quantity = 0 ∧ closed_at ≠ null`).
fn close_position(dp: &Position, exit_price: Decimal, now: chrono::DateTime<Utc>, calculate_realized_pnl: bool) -> Position {
    let mut closed = dp.clone();
    closed.quantity = 0;
    closed.current_price = exit_price;
    closed.status = PositionStatus::Closed;
    closed.closed_at = Some(now);
    closed.last_synced_at = now;
    closed.realized_pnl = if calculate_realized_pnl {
        Some(realized_pnl_for_close(dp.average_price, exit_price, dp.quantity))
    } else {
        None
    };
    closed.unrealized_pnl = Decimal::ZERO;
    closed.unrealized_pnl_pct = Decimal::ZERO;
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use db_sqlite::SqliteDatabase;
    use model::{Account, AccountMode, PositionId};
    use rust_decimal_macros::dec;

    fn db_with_account() -> (SqliteDatabase, AccountId) {
        let db = SqliteDatabase::new_in_memory().expect("in-memory db opens");
        let account = db
            .accounts()
            .insert(&Account {
                id: AccountId(0),
                balance: dec!(50000),
                cash: dec!(50000),
                currency: "USD".to_string(),
                mode: AccountMode::Margin,
                balance_refreshed_at: Utc::now(),
                created_at: Utc::now(),
            })
            .expect("insert account");
        (db, account.id)
    }

    #[test]
    fn new_broker_symbol_creates_an_open_position() {
        let (db, account_id) = db_with_account();
        let broker_positions = vec![BrokerPosition {
            symbol: "AAPL".to_string(),
            qty: 10,
            avg_price: dec!(150),
            market_price: dec!(155),
            unrealized_pnl: dec!(50),
        }];

        let outcome = reconcile(&db, account_id, &broker_positions, false, true).expect("reconcile succeeds");
        assert_eq!(outcome.created, 1);
        let position = db.positions().get_open_by_symbol(account_id, "AAPL").expect("query ok").expect("position exists");
        assert_eq!(position.quantity, 10);
        assert_eq!(position.average_price, dec!(150));
    }

    #[test]
    fn broker_reporting_zero_closes_the_position_with_realized_pnl() {
        let (db, account_id) = db_with_account();
        let opened = db
            .positions()
            .insert(&Position {
                id: PositionId(0),
                account_id,
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
            })
            .expect("insert position");

        let broker_positions = vec![BrokerPosition {
            symbol: "AAPL".to_string(),
            qty: 0,
            avg_price: dec!(150),
            market_price: dec!(155),
            unrealized_pnl: Decimal::ZERO,
        }];

        let outcome = reconcile(&db, account_id, &broker_positions, false, true).expect("reconcile succeeds");
        assert_eq!(outcome.closed, 1);
        let closed = db.positions().get(opened.id).expect("get succeeds");
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.realized_pnl, Some(dec!(50)));
        assert!(closed.invariant_holds());
    }

    #[test]
    fn position_increase_computes_weighted_average_entry_price() {
        let (db, account_id) = db_with_account();
        db.positions()
            .insert(&Position {
                id: PositionId(0),
                account_id,
                symbol: "AAPL".to_string(),
                quantity: 10,
                average_price: dec!(100),
                current_price: dec!(100),
                unrealized_pnl: Decimal::ZERO,
                unrealized_pnl_pct: Decimal::ZERO,
                status: PositionStatus::Open,
                opened_at: Utc::now(),
                closed_at: None,
                last_synced_at: Utc::now(),
                realized_pnl: None,
            })
            .expect("insert position");

        // Broker now reports 20 shares at a blended 120: the 10 added cost 140 each.
        let broker_positions = vec![BrokerPosition {
            symbol: "AAPL".to_string(),
            qty: 20,
            avg_price: dec!(140),
            market_price: dec!(145),
            unrealized_pnl: Decimal::ZERO,
        }];

        reconcile(&db, account_id, &broker_positions, false, true).expect("reconcile succeeds");
        let position = db.positions().get_open_by_symbol(account_id, "AAPL").expect("query ok").expect("exists");
        assert_eq!(position.quantity, 20);
        assert_eq!(position.average_price, dec!(120));
    }

    #[test]
    fn partial_close_reports_realized_pnl_without_touching_average_price() {
        let (db, account_id) = db_with_account();
        db.positions()
            .insert(&Position {
                id: PositionId(0),
                account_id,
                symbol: "AAPL".to_string(),
                quantity: 10,
                average_price: dec!(100),
                current_price: dec!(100),
                unrealized_pnl: Decimal::ZERO,
                unrealized_pnl_pct: Decimal::ZERO,
                status: PositionStatus::Open,
                opened_at: Utc::now(),
                closed_at: None,
                last_synced_at: Utc::now(),
                realized_pnl: None,
            })
            .expect("insert position");

        // Broker now reports 6 of the original 10 shares remain: 4 sold at 120.
        let broker_positions = vec![BrokerPosition {
            symbol: "AAPL".to_string(),
            qty: 6,
            avg_price: dec!(100),
            market_price: dec!(120),
            unrealized_pnl: Decimal::ZERO,
        }];

        let outcome = reconcile(&db, account_id, &broker_positions, false, true).expect("reconcile succeeds");
        assert_eq!(outcome.partial_closes.len(), 1);
        let partial_close = &outcome.partial_closes[0];
        assert_eq!(partial_close.symbol, "AAPL");
        assert_eq!(partial_close.closed_qty, 4);
        assert_eq!(partial_close.realized_pnl, dec!(80)); // (120 - 100) * 4

        let position = db.positions().get_open_by_symbol(account_id, "AAPL").expect("query ok").expect("exists");
        assert_eq!(position.quantity, 6);
        assert_eq!(position.average_price, dec!(100)); // cost basis of the remainder is unchanged
    }

    #[test]
    fn rerunning_with_no_broker_changes_produces_no_new_writes() {
        let (db, account_id) = db_with_account();
        let broker_positions = vec![BrokerPosition {
            symbol: "AAPL".to_string(),
            qty: 10,
            avg_price: dec!(150),
            market_price: dec!(155),
            unrealized_pnl: dec!(50),
        }];
        reconcile(&db, account_id, &broker_positions, false, true).expect("first reconcile");
        let first = db.positions().get_open_by_symbol(account_id, "AAPL").expect("query ok").expect("exists");

        let outcome = reconcile(&db, account_id, &broker_positions, false, true).expect("second reconcile");
        assert_eq!(outcome.created, 0);
        let second = db.positions().get_open_by_symbol(account_id, "AAPL").expect("query ok").expect("exists");
        assert_eq!(first.id, second.id);
        assert_eq!(first.average_price, second.average_price);
    }

    #[test]
    fn missing_position_is_reported_but_left_open_without_the_flag() {
        let (db, account_id) = db_with_account();
        db.positions()
            .insert(&Position {
                id: PositionId(0),
                account_id,
                symbol: "TSLA".to_string(),
                quantity: 5,
                average_price: dec!(200),
                current_price: dec!(200),
                unrealized_pnl: Decimal::ZERO,
                unrealized_pnl_pct: Decimal::ZERO,
                status: PositionStatus::Open,
                opened_at: Utc::now(),
                closed_at: None,
                last_synced_at: Utc::now(),
                realized_pnl: None,
            })
            .expect("insert position");

        let outcome = reconcile(&db, account_id, &[], false, true).expect("reconcile succeeds");
        assert_eq!(outcome.missing_from_broker, vec!["TSLA".to_string()]);
        assert_eq!(outcome.closed, 0);
    }

    #[test]
    fn missing_position_auto_closes_when_configured() {
        let (db, account_id) = db_with_account();
        let opened = db
            .positions()
            .insert(&Position {
                id: PositionId(0),
                account_id,
                symbol: "TSLA".to_string(),
                quantity: 5,
                average_price: dec!(200),
                current_price: dec!(210),
                unrealized_pnl: Decimal::ZERO,
                unrealized_pnl_pct: Decimal::ZERO,
                status: PositionStatus::Open,
                opened_at: Utc::now(),
                closed_at: None,
                last_synced_at: Utc::now(),
                realized_pnl: None,
            })
            .expect("insert position");

        let outcome = reconcile(&db, account_id, &[], true, true).expect("reconcile succeeds");
        assert_eq!(outcome.closed, 1);
        let closed = db.positions().get(opened.id).expect("get succeeds");
        assert_eq!(closed.status, PositionStatus::Closed);
    }
}
