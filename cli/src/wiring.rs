//! Binary-level wiring glue that doesn't belong in any one crate: an owned
//! market data facade (the library's [`core_runtime::market_data::BrokerMarketDataFacade`]
//! borrows `&dyn Broker`, which does not fit a long-lived `Arc`-held daemon)
//! and the one-time account bootstrap a fresh database needs before the
//! scheduler can tick.

use chrono::Utc;
use core_runtime::market_data::MarketDataFacade;
use model::{Account, AccountId, AccountMode, Bar, BarTimeframe, Broker, DatabaseFactory, RuntimeError};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Adapts an owned `Arc<dyn Broker>` to [`MarketDataFacade`], the shape
/// `Scheduler::new` and the price stream need for a process that outlives
/// any single stack frame's borrow.
pub struct OwnedBrokerFacade(Arc<dyn Broker>);

impl OwnedBrokerFacade {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        OwnedBrokerFacade(broker)
    }
}

impl MarketDataFacade for OwnedBrokerFacade {
    fn bars(&self, symbol: &str, timeframe: BarTimeframe, n: usize) -> Result<Vec<Bar>, RuntimeError> {
        if !self.0.is_connected() {
            return Err(RuntimeError::new(
                model::ErrorKind::Disconnected,
                "broker not connected",
            ));
        }
        self.0.bars(symbol, timeframe, n)
    }
}

/// Returns the first known account, or seeds one with a zero balance so a
/// fresh `trust.sqlite3` has something for the scheduler/risk engine to
/// operate on until the first balance refresh (spec §4.4 gate 1) updates it.
pub fn ensure_account(db: &dyn DatabaseFactory) -> Result<AccountId, RuntimeError> {
    let mut accounts = db.accounts();
    let existing = accounts
        .list()
        .map_err(|e| RuntimeError::new(model::ErrorKind::Internal, e.to_string()))?;
    if let Some(account) = existing.into_iter().next() {
        return Ok(account.id);
    }

    let inserted = accounts
        .insert(&Account {
            id: AccountId(0),
            balance: Decimal::ZERO,
            cash: Decimal::ZERO,
            currency: "USD".to_string(),
            mode: AccountMode::Cash,
            balance_refreshed_at: Utc::now(),
            created_at: Utc::now(),
        })
        .map_err(|e| RuntimeError::new(model::ErrorKind::Internal, e.to_string()))?;
    Ok(inserted.id)
}
