//! `PortfolioStream` (spec §4.7): the interval-polled half of the
//! portfolio broadcast. Emits only when the open-position set or aggregate
//! P&L changed since the last poll; the fill/sync-triggered half lives in
//! `HubEventSink::publish_portfolio` (spec §4.6 "publish `portfolio_update`"
//! right after a sync).

use crate::hub::Hub;
use crate::messages::PortfolioUpdateMessage;
use model::{AccountId, DatabaseFactory, Topic};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Runs the portfolio-polling loop until `token` is cancelled.
pub async fn run(
    hub: Arc<Hub>,
    db: Arc<dyn DatabaseFactory>,
    account_id: AccountId,
    interval: Duration,
    token: CancellationToken,
) {
    let mut last_fingerprint: Option<String> = None;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = token.cancelled() => break,
        }

        poll_once(&hub, db.as_ref(), account_id, &mut last_fingerprint);
    }
}

/// One polling tick, factored out of [`run`] for direct testing (the same
/// "test the tick" idiom `price_stream::poll_once` and the scheduler's
/// `evaluation_tick` use).
fn poll_once(
    hub: &Hub,
    db: &dyn DatabaseFactory,
    account_id: AccountId,
    last_fingerprint: &mut Option<String>,
) {
    let positions = match db.positions().list_open(account_id) {
        Ok(positions) => positions,
        Err(err) => {
            warn!(%err, "portfolio stream: failed to list open positions");
            return;
        }
    };

    let message = PortfolioUpdateMessage::new(&positions);

    // Compare on the `data` body only; `timestamp` always differs between polls.
    let fingerprint = match serde_json::to_string(&message.data) {
        Ok(fingerprint) => fingerprint,
        Err(err) => {
            warn!(%err, "portfolio stream: failed to fingerprint portfolio data");
            return;
        }
    };
    if last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
        return;
    }

    let json = match serde_json::to_string(&message) {
        Ok(json) => json,
        Err(err) => {
            warn!(%err, "portfolio stream: failed to serialize portfolio_update");
            return;
        }
    };

    *last_fingerprint = Some(fingerprint);
    hub.broadcast(Topic::Portfolio, &json);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use chrono::Utc;
    use model::{Position, PositionId, PositionStatus, TxError};
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    struct FixedPositions(Vec<Position>);

    impl model::PositionRepository for FixedPositions {
        fn get(&mut self, _id: PositionId) -> Result<Position, TxError> {
            Err(TxError::NotFound)
        }
        fn get_open_by_symbol(&mut self, _account_id: AccountId, _symbol: &str) -> Result<Option<Position>, TxError> {
            Ok(None)
        }
        fn list_open(&mut self, _account_id: AccountId) -> Result<Vec<Position>, TxError> {
            Ok(self.0.clone())
        }
        fn insert(&mut self, position: &Position) -> Result<Position, TxError> {
            Ok(position.clone())
        }
        fn update(&mut self, _position: &Position) -> Result<(), TxError> {
            Ok(())
        }
    }

    struct FixedDb {
        positions: StdMutex<Vec<Position>>,
    }

    impl DatabaseFactory for FixedDb {
        fn accounts(&self) -> Box<dyn model::AccountRepository + '_> {
            unreachable!("not used by this test")
        }
        fn positions(&self) -> Box<dyn model::PositionRepository + '_> {
            Box::new(FixedPositions(self.positions.lock().unwrap_or_else(|e| e.into_inner()).clone()))
        }
        fn trades(&self) -> Box<dyn model::TradeRepository + '_> {
            unreachable!("not used by this test")
        }
        fn day_trades(&self) -> Box<dyn model::DayTradeRepository + '_> {
            unreachable!("not used by this test")
        }
        fn settlements(&self) -> Box<dyn model::SettlementRepository + '_> {
            unreachable!("not used by this test")
        }
        fn run_in_tx(
            &self,
            _f: Box<dyn FnOnce(&dyn DatabaseFactory) -> Result<(), TxError> + '_>,
        ) -> Result<(), TxError> {
            Ok(())
        }
    }

    fn sample_position(symbol: &str, unrealized: rust_decimal::Decimal) -> Position {
        Position {
            id: PositionId(1),
            account_id: AccountId(1),
            symbol: symbol.to_string(),
            quantity: 10,
            average_price: dec!(100),
            current_price: dec!(100),
            unrealized_pnl: unrealized,
            unrealized_pnl_pct: dec!(0),
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            last_synced_at: Utc::now(),
            realized_pnl: None,
        }
    }

    #[test]
    fn broadcasts_once_then_skips_unchanged_polls() {
        let hub = Hub::new(HubConfig::default());
        let mut client = hub.accept().unwrap();
        let db = FixedDb {
            positions: StdMutex::new(vec![sample_position("AAPL", dec!(10))]),
        };
        let mut last_fingerprint = None;

        poll_once(&hub, &db, AccountId(1), &mut last_fingerprint);
        poll_once(&hub, &db, AccountId(1), &mut last_fingerprint);
        poll_once(&hub, &db, AccountId(1), &mut last_fingerprint);

        let mut count = 0;
        while client.outbox.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 1, "unchanged positions should broadcast once, not every poll");
    }

    #[test]
    fn broadcasts_again_when_unrealized_pnl_changes() {
        let hub = Hub::new(HubConfig::default());
        let mut client = hub.accept().unwrap();
        let db = FixedDb {
            positions: StdMutex::new(vec![sample_position("AAPL", dec!(10))]),
        };
        let mut last_fingerprint = None;

        poll_once(&hub, &db, AccountId(1), &mut last_fingerprint);
        *db.positions.lock().unwrap() = vec![sample_position("AAPL", dec!(25))];
        poll_once(&hub, &db, AccountId(1), &mut last_fingerprint);

        let mut count = 0;
        while client.outbox.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 2);
    }
}
