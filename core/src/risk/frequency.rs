use chrono::{Duration, NaiveDate};
use model::{AccountId, DatabaseFactory, ErrorKind, RuntimeError, TradeFrequencyCounter};

/// Loads today's and this rolling week's trade counts for `account_id`
/// (spec §3 `TradeFrequencyCounter`, §4.4 gate 4). Reconstructed from the
/// trade history on every call rather than persisted, per spec.md.
pub fn load_counter(
    db: &dyn DatabaseFactory,
    account_id: AccountId,
    today: NaiveDate,
) -> Result<TradeFrequencyCounter, RuntimeError> {
    let week_start = today - Duration::days(6);

    let mut trades = db.trades();
    let trades_today = u32::try_from(
        trades
            .list_since(account_id, today)
            .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?
            .len(),
    )
    .unwrap_or(u32::MAX);
    let trades_this_week = u32::try_from(
        trades
            .list_since(account_id, week_start)
            .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?
            .len(),
    )
    .unwrap_or(u32::MAX);

    Ok(TradeFrequencyCounter {
        account_id,
        trades_today,
        trades_this_week,
    })
}
