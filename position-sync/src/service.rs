//! The locking/debounce wrapper around [`crate::reconcile::reconcile`]
//! (spec §4.5 steps 1-2, §5, §8 properties 5-6).
//!
//! [`PositionSyncService`] owns one lock per account so that concurrent
//! callers (the scheduler's post-fill trigger, a broker `on_position_update`
//! callback, and an explicit `sync_now` RPC) never run two reconciliation
//! passes for the same account at once, and debounces callback-triggered
//! syncs that arrive within 5s of the last pass.

use crate::reconcile::{reconcile, ReconcileOutcome};
use chrono::{DateTime, Utc};
use model::{AccountId, Broker, DatabaseFactory, ErrorKind, RuntimeError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Minimum gap between two callback-triggered syncs for the same account
/// before a new one is debounced away (spec §4.5, §6
/// `position_sync.sync_on_position_update`).
pub const CALLBACK_DEBOUNCE: Duration = Duration::from_secs(5);

/// Cap on the broker `positions()` RPC issued by a sync pass (spec §4.5 step 2).
pub const POSITIONS_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Typed configuration for the sync service (spec §6 `position_sync.*`).
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Auto-close DB positions the broker no longer reports (spec §4.5 step 5).
    pub mark_missing_as_closed: bool,
    /// Compute `realized_pnl` on positions that close this pass.
    pub calculate_realized_pnl: bool,
    /// Run a sync pass after every trade fill.
    pub sync_on_trade: bool,
    /// Run a debounced sync pass on broker position-update callbacks.
    pub sync_on_position_update: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            mark_missing_as_closed: false,
            calculate_realized_pnl: true,
            sync_on_trade: true,
            sync_on_position_update: true,
        }
    }
}

/// Result of one [`PositionSyncService::sync`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// A reconciliation pass ran to completion.
    Completed(ReconcileOutcome),
    /// Skipped: a callback-triggered sync arrived within [`CALLBACK_DEBOUNCE`]
    /// of the last pass for this account. The caller should schedule a
    /// follow-up (spec §4.5).
    Debounced,
    /// Skipped: another sync for this account is already in flight
    /// (spec §8 property 5, "at-most-one sync").
    Busy,
}

/// Running counters for the sync service (spec §4.5 "Statistics").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncStats {
    /// Every call to [`PositionSyncService::sync`], regardless of outcome.
    pub total: u64,
    /// Passes that reconciled without error.
    pub success: u64,
    /// Passes that returned an error.
    pub failed: u64,
    /// Positions inserted across all passes.
    pub created: u64,
    /// Positions updated across all passes.
    pub updated: u64,
    /// Positions closed across all passes.
    pub closed: u64,
    /// Number of times a broker callback asked for a sync (debounced or not).
    pub callback_triggers: u64,
    /// Timestamp of the most recent completed pass.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Message from the most recent error, if any.
    pub last_error: Option<String>,
}

struct AccountGuard {
    lock: Mutex<()>,
    last_sync_at: Mutex<Option<Instant>>,
}

impl Default for AccountGuard {
    fn default() -> Self {
        AccountGuard {
            lock: Mutex::new(()),
            last_sync_at: Mutex::new(None),
        }
    }
}

/// Position Sync Service (C5, spec §4.5).
pub struct PositionSyncService {
    config: SyncConfig,
    guards: Mutex<HashMap<AccountId, Arc<AccountGuard>>>,
    stats: Mutex<SyncStats>,
}

impl std::fmt::Debug for PositionSyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionSyncService").field("config", &self.config).finish()
    }
}

impl PositionSyncService {
    /// Builds a service with the given configuration.
    pub fn new(config: SyncConfig) -> Self {
        PositionSyncService {
            config,
            guards: Mutex::new(HashMap::new()),
            stats: Mutex::new(SyncStats::default()),
        }
    }

    /// The configuration this service was built with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// A snapshot of the running counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    fn guard_for(&self, account_id: AccountId) -> Arc<AccountGuard> {
        let mut guards = self.guards.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(guards.entry(account_id).or_default())
    }

    /// Performs one reconciliation pass for `account_id`, guarded by the
    /// per-account lock (spec §8 property 5). Returns [`SyncOutcome::Busy`]
    /// rather than blocking if a pass is already in flight, per spec §5
    /// ("sync calls that cannot acquire it return `busy`").
    pub fn sync(
        &self,
        db: &dyn DatabaseFactory,
        broker: &dyn Broker,
        account_id: AccountId,
    ) -> Result<SyncOutcome, RuntimeError> {
        let guard = self.guard_for(account_id);
        let Ok(_held) = guard.lock.try_lock() else {
            return Ok(SyncOutcome::Busy);
        };

        self.bump_total();

        let result = self.run_pass(db, broker, account_id);
        self.record(&result);

        if let Ok(mut last) = guard.last_sync_at.lock() {
            *last = Some(Instant::now());
        }

        result.map(SyncOutcome::Completed)
    }

    /// Entry point for a broker `on_position_update` callback (spec §4.5,
    /// §6 `position_sync.sync_on_position_update`): debounces a sync that
    /// arrives within [`CALLBACK_DEBOUNCE`] of the previous one.
    pub fn sync_from_callback(
        &self,
        db: &dyn DatabaseFactory,
        broker: &dyn Broker,
        account_id: AccountId,
    ) -> Result<SyncOutcome, RuntimeError> {
        {
            let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            stats.callback_triggers += 1;
        }

        let guard = self.guard_for(account_id);
        let recently_synced = guard
            .last_sync_at
            .lock()
            .ok()
            .and_then(|last| *last)
            .is_some_and(|at| at.elapsed() < CALLBACK_DEBOUNCE);

        if recently_synced {
            tracing::debug!(%account_id, "debouncing callback-triggered sync");
            return Ok(SyncOutcome::Debounced);
        }

        self.sync(db, broker, account_id)
    }

    fn run_pass(
        &self,
        db: &dyn DatabaseFactory,
        broker: &dyn Broker,
        account_id: AccountId,
    ) -> Result<ReconcileOutcome, RuntimeError> {
        if !broker.is_connected() {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "broker not connected"));
        }

        let broker_positions = fetch_positions_with_timeout(broker, POSITIONS_FETCH_TIMEOUT)?;

        reconcile(
            db,
            account_id,
            &broker_positions,
            self.config.mark_missing_as_closed,
            self.config.calculate_realized_pnl,
        )
    }

    fn bump_total(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.total += 1;
        }
    }

    fn record(&self, result: &Result<ReconcileOutcome, RuntimeError>) {
        let Ok(mut stats) = self.stats.lock() else {
            return;
        };
        match result {
            Ok(outcome) => {
                stats.success += 1;
                stats.created += u64::from(outcome.created);
                stats.updated += u64::from(outcome.updated);
                stats.closed += u64::from(outcome.closed);
                stats.last_sync_at = Some(Utc::now());
                stats.last_error = None;
            }
            Err(err) => {
                stats.failed += 1;
                stats.last_error = Some(err.to_string());
            }
        }
    }
}

/// Runs `broker.positions()` on a dedicated thread and bounds the wait to
/// `timeout` (spec §4.5 step 2: "Fetch broker_positions with a 30-second
/// cap; on timeout return error(timeout)"). `Broker` implementations are
/// blocking by design (spec §9), so a timeout can only be enforced from
/// the outside.
fn fetch_positions_with_timeout(
    broker: &dyn Broker,
    timeout: Duration,
) -> Result<Vec<model::BrokerPosition>, RuntimeError> {
    std::thread::scope(|scope| {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        scope.spawn(move || {
            let _ = tx.send(broker.positions());
        });
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::new(
                ErrorKind::Timeout,
                "broker positions() did not return within 30s",
            )),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_sqlite::SqliteDatabase;
    use ibkr_broker::IbkrBroker;
    use model::{Account, AccountMode};
    use rust_decimal_macros::dec;
    use std::time::Duration;

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

    fn connected_broker() -> IbkrBroker<ibkr_broker::MockGatewayBackend> {
        let broker = IbkrBroker::new_mock();
        broker.connect("localhost", 7497, 1, Duration::from_secs(1)).expect("connect");
        broker
    }

    #[test]
    fn disconnected_broker_is_reported_without_mutating_the_store() {
        let (db, account_id) = db_with_account();
        let broker = IbkrBroker::new_mock();
        let service = PositionSyncService::new(SyncConfig::default());

        let err = service.sync(&db, &broker, account_id).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Disconnected);
        assert_eq!(service.stats().failed, 1);
    }

    #[test]
    fn concurrent_sync_for_the_same_account_returns_busy() {
        let (db, account_id) = db_with_account();
        let broker = connected_broker();
        let service = PositionSyncService::new(SyncConfig::default());

        let guard = service.guard_for(account_id);
        let _held = guard.lock.try_lock().expect("first acquire succeeds");

        let outcome = service.sync(&db, &broker, account_id).expect("sync call does not error");
        assert_eq!(outcome, SyncOutcome::Busy);
    }

    #[test]
    fn callback_triggered_sync_is_debounced_when_recent() {
        let (db, account_id) = db_with_account();
        let broker = connected_broker();
        let service = PositionSyncService::new(SyncConfig::default());

        let first = service.sync_from_callback(&db, &broker, account_id).expect("first sync");
        assert!(matches!(first, SyncOutcome::Completed(_)));

        let second = service.sync_from_callback(&db, &broker, account_id).expect("second sync");
        assert_eq!(second, SyncOutcome::Debounced);
        assert_eq!(service.stats().callback_triggers, 2);
    }

    #[test]
    fn successful_sync_updates_stats() {
        let (db, account_id) = db_with_account();
        let broker = connected_broker();
        broker.mock_backend().set_positions(vec![model::BrokerPosition {
            symbol: "AAPL".to_string(),
            qty: 10,
            avg_price: dec!(150),
            market_price: dec!(155),
            unrealized_pnl: dec!(50),
        }]);
        let service = PositionSyncService::new(SyncConfig::default());

        let outcome = service.sync(&db, &broker, account_id).expect("sync succeeds");
        match outcome {
            SyncOutcome::Completed(reconcile_outcome) => assert_eq!(reconcile_outcome.created, 1),
            other => panic!("expected Completed, got {other:?}"),
        }
        let stats = service.stats();
        assert_eq!(stats.success, 1);
        assert_eq!(stats.created, 1);
        assert!(stats.last_sync_at.is_some());
    }
}
