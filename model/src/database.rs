use crate::account::{Account, AccountId};
use crate::day_trade::{DayTrade, DayTradeId};
use crate::position::{Position, PositionId};
use crate::settlement::{SettlementRow, SettlementRowId};
use crate::trade::{Trade, TradeId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Failure modes for the durable store (spec §4.8).
#[derive(Debug, Error)]
pub enum TxError {
    /// The underlying connection or query failed.
    #[error("database error: {0}")]
    Db(String),
    /// The transaction was rolled back, typically because the closure
    /// returned an error and the SAVEPOINT was released via ROLLBACK TO.
    #[error("transaction rolled back: {0}")]
    RolledBack(String),
    /// The requested row does not exist.
    #[error("not found")]
    NotFound,
}

/// Repository for `Account` rows (spec §3, §4.8).
pub trait AccountRepository: Send {
    /// Fetches an account by id.
    fn get(&mut self, id: AccountId) -> Result<Account, TxError>;

    /// Lists every known account.
    fn list(&mut self) -> Result<Vec<Account>, TxError>;

    /// Inserts a new account, returning it with its store-assigned id.
    fn insert(&mut self, account: &Account) -> Result<Account, TxError>;

    /// Persists an updated balance/mode/refresh timestamp for an existing account.
    fn update(&mut self, account: &Account) -> Result<(), TxError>;
}

/// Repository for `Position` rows (spec §3, §4.8).
pub trait PositionRepository: Send {
    /// Fetches a position by id.
    fn get(&mut self, id: PositionId) -> Result<Position, TxError>;

    /// Fetches the open position for `account_id`/`symbol`, if any.
    fn get_open_by_symbol(
        &mut self,
        account_id: AccountId,
        symbol: &str,
    ) -> Result<Option<Position>, TxError>;

    /// Lists all open positions for an account, used by position sync and the portfolio stream.
    fn list_open(&mut self, account_id: AccountId) -> Result<Vec<Position>, TxError>;

    /// Inserts a newly opened position.
    fn insert(&mut self, position: &Position) -> Result<Position, TxError>;

    /// Persists quantity/price/P&L/status changes to an existing position.
    fn update(&mut self, position: &Position) -> Result<(), TxError>;
}

/// Repository for `Trade` rows (spec §3, §4.8).
pub trait TradeRepository: Send {
    /// Fetches a trade by id.
    fn get(&mut self, id: TradeId) -> Result<Trade, TxError>;

    /// Lists trades for an account executed on or after `since`, newest first.
    fn list_since(&mut self, account_id: AccountId, since: NaiveDate) -> Result<Vec<Trade>, TxError>;

    /// Inserts an executed trade.
    fn insert(&mut self, trade: &Trade) -> Result<Trade, TxError>;
}

/// Repository for `DayTrade` rows (spec §3, §4.8), backing the pattern day
/// trader frequency counter (§3 `TradeFrequencyCounter`).
pub trait DayTradeRepository: Send {
    /// Inserts a day trade record (an open/close round trip on the same session day).
    fn insert(&mut self, day_trade: &DayTrade) -> Result<DayTrade, TxError>;

    /// Counts day trades for `account_id` with `executed_date` in `[start, end]`, inclusive.
    fn count_in_window(
        &mut self,
        account_id: AccountId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u32, TxError>;

    /// Lists day trades for an account in `[start, end]`, used for audit and UI display.
    fn list_in_window(
        &mut self,
        account_id: AccountId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DayTrade>, TxError>;
}

/// Repository for `SettlementRow` rows (spec §3, §4.8), backing the risk
/// engine's available-settled-cash gate.
pub trait SettlementRepository: Send {
    /// Inserts a settlement row created alongside a trade.
    fn insert(&mut self, row: &SettlementRow) -> Result<SettlementRow, TxError>;

    /// Lists unsettled rows for an account as of `as_of` (settlement_date > as_of).
    fn list_unsettled(
        &mut self,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> Result<Vec<SettlementRow>, TxError>;

    /// Sum of the absolute value of every unsettled row's amount for an account,
    /// the quantity subtracted from cash to derive available settled cash (spec §9).
    fn sum_unsettled_absolute(
        &mut self,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> Result<Decimal, TxError>;

    /// Marks rows with `settlement_date <= as_of` as settled, returning the count updated.
    fn settle_due(&mut self, account_id: AccountId, as_of: NaiveDate) -> Result<u32, TxError>;

    /// Fetches a settlement row by id.
    fn get(&mut self, id: SettlementRowId) -> Result<SettlementRow, TxError>;
}

/// Factory for per-entity repositories and transactional execution (spec §4.8).
///
/// Implementations hold a single shared connection (SQLite has no useful
/// connection pooling for a single-process trading runtime) and serialize
/// access behind a mutex; `run_in_tx` wraps the closure in a SAVEPOINT so
/// that multi-repository writes (e.g. inserting a trade, its settlement
/// row, and updating the position in one risk-gated action) commit or roll
/// back atomically.
pub trait DatabaseFactory: Send + Sync {
    /// Opens a handle to the account repository.
    fn accounts(&self) -> Box<dyn AccountRepository + '_>;

    /// Opens a handle to the position repository.
    fn positions(&self) -> Box<dyn PositionRepository + '_>;

    /// Opens a handle to the trade repository.
    fn trades(&self) -> Box<dyn TradeRepository + '_>;

    /// Opens a handle to the day trade repository.
    fn day_trades(&self) -> Box<dyn DayTradeRepository + '_>;

    /// Opens a handle to the settlement repository.
    fn settlements(&self) -> Box<dyn SettlementRepository + '_>;

    /// Runs `f` inside a SAVEPOINT, committing on `Ok` and rolling back on `Err`.
    /// `f` receives the same factory so it can open further repository
    /// handles that participate in the same transaction.
    fn run_in_tx(
        &self,
        f: Box<dyn FnOnce(&dyn DatabaseFactory) -> Result<(), TxError> + '_>,
    ) -> Result<(), TxError>;
}
