use crate::workers::{AccountDB, DayTradeDB, PositionDB, SettlementDB, TradeDB};
use diesel::prelude::*;
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use model::database::{
    AccountRepository, DatabaseFactory, DayTradeRepository, PositionRepository,
    SettlementRepository, TradeRepository, TxError,
};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Failure opening or migrating the SQLite database file.
#[derive(Debug)]
pub struct OpenError(String);

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to open database: {}", self.0)
    }
}

impl Error for OpenError {}

/// SQLite implementation of the durable store (C8, spec §4.8).
///
/// Holds a single shared connection behind a mutex: SQLite has no useful
/// connection pooling benefit for a single-process trading runtime, and a
/// shared connection is what makes `run_in_tx`'s SAVEPOINT wrapping work
/// across repository handles opened from the same `&self` borrow.
pub struct SqliteDatabase {
    connection: Arc<Mutex<SqliteConnection>>,
}

impl fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("connection", &"Arc<Mutex<SqliteConnection>>")
            .finish()
    }
}

impl SqliteDatabase {
    /// Opens (or creates) the database at `url`, running pending migrations
    /// and enabling `PRAGMA foreign_keys`.
    pub fn new(url: &str) -> Result<Self, OpenError> {
        let mut connection = SqliteConnection::establish(url).map_err(|e| OpenError(e.to_string()))?;
        connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| OpenError(e.to_string()))?;
        Self::configure_connection(&mut connection).map_err(|e| OpenError(e.to_string()))?;
        Ok(SqliteDatabase {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Wraps an already-open, already-migrated connection, used internally
    /// by `run_in_tx` so nested repository handles share the savepoint.
    fn new_from(connection: Arc<Mutex<SqliteConnection>>) -> Self {
        SqliteDatabase { connection }
    }

    /// An in-memory database with migrations applied, for tests.
    pub fn new_in_memory() -> Result<Self, OpenError> {
        let mut connection = SqliteConnection::establish(":memory:").map_err(|e| OpenError(e.to_string()))?;
        connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| OpenError(e.to_string()))?;
        Self::configure_connection(&mut connection).map_err(|e| OpenError(e.to_string()))?;
        Ok(SqliteDatabase {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn configure_connection(connection: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
        sql_query("PRAGMA foreign_keys = ON;").execute(connection)?;
        Ok(())
    }

    fn validate_savepoint_name(name: &str) -> Result<(), TxError> {
        if name.is_empty() || !name.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'_') {
            return Err(TxError::Db(format!("invalid savepoint name '{name}'")));
        }
        Ok(())
    }

    fn execute_savepoint_statement(&self, statement: &str, name: &str) -> Result<(), TxError> {
        Self::validate_savepoint_name(name)?;
        let sql = format!("{statement} {name}");
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        sql_query(sql).execute(&mut **conn).map_err(|e| TxError::Db(e.to_string()))?;
        Ok(())
    }
}

impl DatabaseFactory for SqliteDatabase {
    fn accounts(&self) -> Box<dyn AccountRepository + '_> {
        Box::new(AccountDB::new(self.connection.clone()))
    }

    fn positions(&self) -> Box<dyn PositionRepository + '_> {
        Box::new(PositionDB::new(self.connection.clone()))
    }

    fn trades(&self) -> Box<dyn TradeRepository + '_> {
        Box::new(TradeDB::new(self.connection.clone()))
    }

    fn day_trades(&self) -> Box<dyn DayTradeRepository + '_> {
        Box::new(DayTradeDB::new(self.connection.clone()))
    }

    fn settlements(&self) -> Box<dyn SettlementRepository + '_> {
        Box::new(SettlementDB::new(self.connection.clone()))
    }

    fn run_in_tx(
        &self,
        f: Box<dyn FnOnce(&dyn DatabaseFactory) -> Result<(), TxError> + '_>,
    ) -> Result<(), TxError> {
        let name = format!("sp{}", SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed));
        self.execute_savepoint_statement("SAVEPOINT", &name)?;

        let nested = SqliteDatabase::new_from(self.connection.clone());
        match f(&nested) {
            Ok(()) => {
                self.execute_savepoint_statement("RELEASE SAVEPOINT", &name)?;
                Ok(())
            }
            Err(err) => {
                let rollback = self.execute_savepoint_statement("ROLLBACK TO SAVEPOINT", &name);
                let _ = self.execute_savepoint_statement("RELEASE SAVEPOINT", &name);
                rollback?;
                Err(TxError::RolledBack(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::{Account, AccountId, AccountMode};
    use rust_decimal_macros::dec;

    fn test_db() -> SqliteDatabase {
        SqliteDatabase::new_in_memory().expect("in-memory db opens")
    }

    fn draft_account() -> Account {
        Account {
            id: AccountId(0),
            balance: dec!(20000),
            cash: dec!(20000),
            currency: "USD".to_string(),
            mode: AccountMode::Cash,
            balance_refreshed_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_then_get_round_trips_an_account() {
        let db = test_db();
        let inserted = db.accounts().insert(&draft_account()).expect("insert succeeds");
        let fetched = db.accounts().get(inserted.id).expect("get succeeds");
        assert_eq!(fetched.balance, dec!(20000));
        assert_eq!(fetched.mode, AccountMode::Cash);
    }

    #[test]
    fn run_in_tx_rolls_back_every_write_on_error() {
        let db = test_db();
        let account = db.accounts().insert(&draft_account()).expect("insert succeeds");

        let result = db.run_in_tx(Box::new(move |tx_db| {
            let mut updated = account.clone();
            updated.balance = dec!(1);
            tx_db.accounts().update(&updated)?;
            Err(TxError::Db("forced failure".to_string()))
        }));
        assert!(result.is_err());

        let fetched = db.accounts().get(account.id).expect("get succeeds");
        assert_eq!(fetched.balance, dec!(20000));
    }

    #[test]
    fn run_in_tx_commits_every_write_on_success() {
        let db = test_db();
        let account = db.accounts().insert(&draft_account()).expect("insert succeeds");

        db.run_in_tx(Box::new(move |tx_db| {
            let mut updated = account.clone();
            updated.balance = dec!(5000);
            tx_db.accounts().update(&updated)
        }))
        .expect("tx succeeds");

        let fetched = db.accounts().get(account.id).expect("get succeeds");
        assert_eq!(fetched.balance, dec!(5000));
    }
}
