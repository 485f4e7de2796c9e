//! The Trading Scheduler (C6, spec §4.6): owns the lifecycle state machine
//! and the two cooperative loops (evaluation, exit) that drive a cycle
//! through C2 -> C3 -> C4 -> C1 -> C5 each tick.

use crate::config::SchedulerConfig;
use crate::stats::{ConsecutiveFailureTracker, SchedulerStats, UptimeClock};
use crate::state::{SchedulerState, StateError, StateTransition};
use chrono::Utc;
use core_runtime::market_data::{is_market_hours_now, MarketDataFacade};
use core_runtime::risk::RiskEngine;
use core_runtime::strategy::StrategyEvaluator;
use model::{
    AccountId, BrokerEvent, BrokerOrderId, Broker, DatabaseFactory, ErrorKind, EventSink, OrderSide,
    OrderType, SignalKind, Trade, TradeId, TradeSide,
};
use position_sync::PositionSyncService;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Failure modes for scheduler lifecycle operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// The requested operation isn't defined from the current state.
    #[error(transparent)]
    InvalidState(#[from] StateError),
}

/// Point-in-time view of the scheduler: its lifecycle state and counters.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerStatus {
    /// Current lifecycle state.
    pub state: SchedulerState,
    /// Running counters.
    pub stats: SchedulerStats,
}

struct Inner {
    config: SchedulerConfig,
    account_id: AccountId,
    broker: Arc<dyn Broker>,
    db: Arc<dyn DatabaseFactory>,
    market_data: Arc<dyn MarketDataFacade>,
    evaluator: Arc<StrategyEvaluator>,
    risk: Arc<RiskEngine>,
    sync: Arc<PositionSyncService>,
    sink: Arc<dyn EventSink>,

    state: Mutex<SchedulerState>,
    cancellation: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stats: Mutex<SchedulerStats>,
    uptime: Mutex<UptimeClock>,
    evaluation_failures: Mutex<ConsecutiveFailureTracker>,
    exit_failures: Mutex<ConsecutiveFailureTracker>,
    /// Maps a just-placed broker order back to its originating strategy, so
    /// a later `OrderFilled` event can attribute the `Trade.strategy_id`.
    pending_orders: Mutex<HashMap<BrokerOrderId, String>>,
}

/// The scheduler (C6). Cheaply `Clone`: every clone shares the same
/// underlying state, so the evaluation and exit loop tasks can each hold
/// one without the caller needing to manage lifetimes across `tokio::spawn`.
#[derive(Clone)]
pub struct Scheduler(Arc<Inner>);

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").field("state", &self.state()).finish()
    }
}

#[allow(clippy::too_many_arguments)]
impl Scheduler {
    /// Builds a scheduler over its collaborators. Does not start any loops;
    /// call [`Scheduler::start`] (or set `config.enabled` and have the
    /// caller honor it at boot) to begin ticking.
    pub fn new(
        config: SchedulerConfig,
        account_id: AccountId,
        broker: Arc<dyn Broker>,
        db: Arc<dyn DatabaseFactory>,
        market_data: Arc<dyn MarketDataFacade>,
        evaluator: Arc<StrategyEvaluator>,
        risk: Arc<RiskEngine>,
        sync: Arc<PositionSyncService>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Scheduler(Arc::new(Inner {
            config,
            account_id,
            broker,
            db,
            market_data,
            evaluator,
            risk,
            sync,
            sink,
            state: Mutex::new(SchedulerState::Stopped),
            cancellation: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            stats: Mutex::new(SchedulerStats::default()),
            uptime: Mutex::new(UptimeClock::default()),
            evaluation_failures: Mutex::new(ConsecutiveFailureTracker::default()),
            exit_failures: Mutex::new(ConsecutiveFailureTracker::default()),
            pending_orders: Mutex::new(HashMap::new()),
        }))
    }

    pub(crate) fn config(&self) -> &SchedulerConfig {
        &self.0.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *self.0.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// A snapshot of state + counters, the `status` admin operation (spec §6).
    pub fn status(&self) -> SchedulerStatus {
        let mut stats = *self.0.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.uptime_seconds = self.0.uptime.lock().unwrap_or_else(|p| p.into_inner()).uptime_seconds();
        SchedulerStatus { state: self.state(), stats }
    }

    fn transition(&self, event: StateTransition) -> Result<SchedulerState, SchedulerError> {
        let mut guard = self.0.state.lock().unwrap_or_else(|p| p.into_inner());
        let next = guard.transition(event)?;
        *guard = next;
        Ok(next)
    }

    /// Starts the evaluation and exit loops (spec §4.6). Serialized with the
    /// state mutex; a no-op error if not currently `Stopped`.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.transition(StateTransition::Start)?;

        let token = CancellationToken::new();
        *self.0.cancellation.lock().unwrap_or_else(|p| p.into_inner()) = Some(token.clone());
        self.0.uptime.lock().unwrap_or_else(|p| p.into_inner()).start();

        let evaluation_task = tokio::spawn(crate::evaluation::run_loop(self.clone(), token.clone()));
        let exit_task = tokio::spawn(crate::exit_loop::run_loop(self.clone(), token));
        self.0.tasks.lock().unwrap_or_else(|p| p.into_inner()).extend([evaluation_task, exit_task]);

        self.transition(StateTransition::Started)?;
        tracing::info!("scheduler started");
        Ok(())
    }

    /// Cancels both loops, awaits their drain, and returns to `Stopped`. This
    /// is only the first step of the spec §5 shutdown sequence: stopping the
    /// websocket streams, closing the hub, and disconnecting the broker are
    /// owned by the daemon's `run()` shutdown path, not by the scheduler —
    /// the scheduler never holds a handle to the hub or to the broker beyond
    /// the one it trades through.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        self.transition(StateTransition::Stop)?;

        if let Some(token) = self.0.cancellation.lock().unwrap_or_else(|p| p.into_inner()).take() {
            token.cancel();
        }
        let tasks: Vec<_> = self.0.tasks.lock().unwrap_or_else(|p| p.into_inner()).drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        self.0.uptime.lock().unwrap_or_else(|p| p.into_inner()).stop();

        self.transition(StateTransition::Stopped)?;
        tracing::info!("scheduler stopped");
        Ok(())
    }

    /// Pauses both loops: they keep ticking but skip their work (spec §4.6).
    pub fn pause(&self) -> Result<(), SchedulerError> {
        self.transition(StateTransition::Pause)?;
        tracing::info!("scheduler paused");
        Ok(())
    }

    /// Resumes work after [`Scheduler::pause`].
    pub fn resume(&self) -> Result<(), SchedulerError> {
        self.transition(StateTransition::Resume)?;
        tracing::info!("scheduler resumed");
        Ok(())
    }

    pub(crate) fn record_error(&self, tracker: &Mutex<ConsecutiveFailureTracker>, kind: ErrorKind) -> u32 {
        self.0.stats.lock().unwrap_or_else(|p| p.into_inner()).errors += 1;
        tracker.lock().unwrap_or_else(|p| p.into_inner()).record_failure(kind)
    }

    pub(crate) fn record_tick_success(&self, tracker: &Mutex<ConsecutiveFailureTracker>) {
        tracker.lock().unwrap_or_else(|p| p.into_inner()).record_success();
    }

    pub(crate) fn evaluation_failures(&self) -> &Mutex<ConsecutiveFailureTracker> {
        &self.0.evaluation_failures
    }

    pub(crate) fn exit_failures(&self) -> &Mutex<ConsecutiveFailureTracker> {
        &self.0.exit_failures
    }

    /// Preconditions gating a tick (spec §4.6 step 1): scheduler running,
    /// broker connected if required, within market hours if enforced.
    pub(crate) fn preconditions_met(&self) -> bool {
        if self.state() != SchedulerState::Running {
            return false;
        }
        if self.0.config.require_broker_connection && !self.0.broker.is_connected() {
            tracing::debug!("skipping tick: broker not connected");
            return false;
        }
        if self.0.config.market_hours_only && !is_market_hours_now() {
            tracing::debug!("skipping tick: outside market hours");
            return false;
        }
        true
    }

    /// Runs one evaluation tick (spec §4.6 "Evaluation loop").
    pub(crate) async fn evaluation_tick(&self) {
        if !self.preconditions_met() {
            return;
        }

        let inner = Arc::clone(&self.0);
        let outcome = tokio::task::block_in_place(move || run_evaluation_tick(&inner));

        {
            let mut stats = self.0.stats.lock().unwrap_or_else(|p| p.into_inner());
            stats.evaluations_run += 1;
            stats.last_evaluation = Some(Utc::now());
            stats.signals_generated += outcome.signals_generated;
            stats.trades_executed += outcome.trades_executed;
            stats.trades_rejected += outcome.trades_rejected;
            if outcome.trades_executed > 0 {
                stats.last_trade = Some(Utc::now());
            }
        }

        if outcome.tick_errors == 0 {
            self.record_tick_success(self.evaluation_failures());
        } else {
            self.record_error(self.evaluation_failures(), ErrorKind::Unavailable);
        }
    }

    /// Runs one exit-check tick (spec §4.6 "Exit loop").
    pub(crate) async fn exit_tick(&self) {
        if !self.preconditions_met() {
            return;
        }

        let inner = Arc::clone(&self.0);
        let outcome = tokio::task::block_in_place(move || run_exit_tick(&inner));

        {
            let mut stats = self.0.stats.lock().unwrap_or_else(|p| p.into_inner());
            stats.monitored_positions = outcome.monitored_positions;
            stats.trades_executed += outcome.trades_executed;
            stats.trades_rejected += outcome.trades_rejected;
            if outcome.trades_executed > 0 {
                stats.last_trade = Some(Utc::now());
            }
        }

        if outcome.tick_errors == 0 {
            self.record_tick_success(self.exit_failures());
        } else {
            self.record_error(self.exit_failures(), ErrorKind::Unavailable);
        }
    }
}

#[derive(Default)]
struct TickOutcome {
    signals_generated: u64,
    trades_executed: u64,
    trades_rejected: u64,
    tick_errors: u64,
}

#[derive(Default)]
struct ExitTickOutcome {
    monitored_positions: u64,
    trades_executed: u64,
    trades_rejected: u64,
    tick_errors: u64,
}

/// The blocking body of one evaluation tick, run inside
/// `block_in_place` so the broker/store RPCs (which are synchronous by
/// design, spec §9) never stall the async executor while still letting
/// callers `.await` around it.
fn run_evaluation_tick(inner: &Inner) -> TickOutcome {
    let mut outcome = TickOutcome::default();

    let open_count = match inner.db.positions().list_open(inner.account_id) {
        Ok(positions) => positions.len(),
        Err(err) => {
            tracing::warn!(%err, "failed to list open positions for evaluation tick");
            outcome.tick_errors += 1;
            return outcome;
        }
    };

    for instance in inner.evaluator.enabled_instances() {
        let bars = match inner.market_data.bars(&instance.symbol, instance.timeframe, inner.config.bars_per_evaluation) {
            Ok(bars) => bars,
            Err(err) => {
                tracing::warn!(symbol = %instance.symbol, %err, "market data unavailable this tick");
                outcome.tick_errors += 1;
                continue;
            }
        };

        let open_position = match inner.db.positions().get_open_by_symbol(inner.account_id, &instance.symbol) {
            Ok(position) => position,
            Err(err) => {
                tracing::warn!(symbol = %instance.symbol, %err, "failed to read open position");
                outcome.tick_errors += 1;
                continue;
            }
        };

        let signal = match inner.evaluator.evaluate(&instance.id, &bars, open_position.as_ref()) {
            Ok(signal) => signal,
            Err(err) => {
                tracing::warn!(strategy = %instance.id, %err, "strategy evaluation failed");
                outcome.tick_errors += 1;
                continue;
            }
        };

        if !signal.is_actionable() {
            continue;
        }
        outcome.signals_generated += 1;

        if signal.confidence < inner.config.min_confidence {
            continue;
        }
        if open_count >= inner.config.max_concurrent_trades {
            continue;
        }

        let side = match signal.kind {
            SignalKind::Buy => OrderSide::Buy,
            SignalKind::Sell => OrderSide::Sell,
            SignalKind::Hold | SignalKind::Exit => continue,
        };

        let validation = match inner.risk.validate(
            inner.db.as_ref(),
            &account_snapshot(inner),
            &core_runtime::risk::ValidationRequest {
                symbol: &instance.symbol,
                side,
                qty: signal.quantity,
                price: signal.price,
                confidence: Some(signal.confidence),
                will_create_day_trade: false,
            },
        ) {
            Ok(validation) => validation,
            Err(err) => {
                tracing::warn!(symbol = %instance.symbol, %err, "risk validation failed");
                outcome.tick_errors += 1;
                continue;
            }
        };

        if !validation.ok {
            tracing::info!(symbol = %instance.symbol, reason = %validation.compliance_message, "signal rejected by risk engine");
            outcome.trades_rejected += 1;
            continue;
        }

        let Some(qty) = validation.position_size.or(signal.quantity) else {
            outcome.trades_rejected += 1;
            continue;
        };
        if qty == 0 {
            outcome.trades_rejected += 1;
            continue;
        }

        match inner.broker.place_order(&instance.symbol, side, qty, OrderType::Market) {
            Ok(order_id) => {
                inner.pending_orders.lock().unwrap_or_else(|p| p.into_inner()).insert(order_id, instance.id.clone());
                inner.sink.publish_signal(&signal);
                outcome.trades_executed += 1;
            }
            Err(err) => {
                tracing::warn!(symbol = %instance.symbol, %err, "order placement failed");
                outcome.tick_errors += 1;
            }
        }
    }

    drain_fills(inner, &mut outcome.tick_errors);
    outcome
}

/// Evaluates `should_exit` and the profit-taking plan for every open
/// position (spec §4.6 "Exit loop"), routing exits through the risk engine
/// as sells the same way the evaluation loop routes entries.
fn run_exit_tick(inner: &Inner) -> ExitTickOutcome {
    let mut outcome = ExitTickOutcome::default();

    let positions = match inner.db.positions().list_open(inner.account_id) {
        Ok(positions) => positions,
        Err(err) => {
            tracing::warn!(%err, "failed to list open positions for exit tick");
            outcome.tick_errors += 1;
            return outcome;
        }
    };
    outcome.monitored_positions = positions.len() as u64;

    for position in &positions {
        let Some(instance) = inner.evaluator.enabled_instances().find(|i| i.symbol == position.symbol) else {
            continue;
        };

        let bars = match inner.market_data.bars(&position.symbol, instance.timeframe, inner.config.bars_per_evaluation) {
            Ok(bars) => bars,
            Err(err) => {
                tracing::warn!(symbol = %position.symbol, %err, "market data unavailable for exit check");
                outcome.tick_errors += 1;
                continue;
            }
        };

        let exit_signal = match inner.evaluator.check_exit(&instance.id, position, &bars) {
            Ok(signal) => signal,
            Err(err) => {
                tracing::warn!(symbol = %position.symbol, %err, "exit check failed");
                outcome.tick_errors += 1;
                continue;
            }
        };

        let Some(signal) = exit_signal else {
            continue;
        };

        let qty = signal.quantity.unwrap_or(position.quantity).abs();
        if qty == 0 {
            continue;
        }

        let today = Utc::now().date_naive();
        let will_create_day_trade = position.opened_at.date_naive() == today;

        let validation = match inner.risk.validate(
            inner.db.as_ref(),
            &account_snapshot(inner),
            &core_runtime::risk::ValidationRequest {
                symbol: &position.symbol,
                side: OrderSide::Sell,
                qty: Some(qty),
                price: signal.price,
                confidence: None,
                will_create_day_trade,
            },
        ) {
            Ok(validation) => validation,
            Err(err) => {
                tracing::warn!(symbol = %position.symbol, %err, "risk validation failed for exit");
                outcome.tick_errors += 1;
                continue;
            }
        };

        if !validation.ok {
            outcome.trades_rejected += 1;
            continue;
        }

        match inner.broker.place_order(&position.symbol, OrderSide::Sell, qty, OrderType::Market) {
            Ok(order_id) => {
                inner.pending_orders.lock().unwrap_or_else(|p| p.into_inner()).insert(order_id, instance.id.clone());
                inner.sink.publish_signal(&signal);
                outcome.trades_executed += 1;
            }
            Err(err) => {
                tracing::warn!(symbol = %position.symbol, %err, "exit order placement failed");
                outcome.tick_errors += 1;
            }
        }
    }

    drain_fills(inner, &mut outcome.tick_errors);
    outcome
}

/// Drains pending `OrderFilled`/`PositionUpdate` events from the broker
/// (spec §4.6 "On order fill callback"): records the trade and its
/// settlement bookkeeping, triggers a debounced position sync, and
/// publishes `trade_executed`/`portfolio_update`.
fn drain_fills(inner: &Inner, tick_errors: &mut u64) {
    for event in inner.broker.poll_events(inner.config.max_events_per_tick) {
        match event {
            BrokerEvent::OrderFilled {
                broker_order_id,
                symbol,
                side,
                quantity,
                price,
                executed_at,
            } => {
                let strategy_id = inner
                    .pending_orders
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .remove(&broker_order_id);

                let trade_side = match side {
                    OrderSide::Buy => TradeSide::Buy,
                    OrderSide::Sell => TradeSide::Sell,
                };
                let opened_trade_id = if trade_side == TradeSide::Sell {
                    same_day_opening_trade(inner, &symbol, executed_at.date_naive())
                } else {
                    None
                };
                let realized_pnl = if trade_side == TradeSide::Sell {
                    realized_pnl_for_sell(inner, &symbol, quantity, price)
                } else {
                    None
                };

                let trade = Trade {
                    id: TradeId(0),
                    account_id: inner.account_id,
                    symbol: symbol.clone(),
                    side: trade_side,
                    quantity,
                    price,
                    executed_at,
                    broker_order_id,
                    strategy_id,
                    realized_pnl,
                };

                match inner.risk.record_fill(inner.db.as_ref(), trade, opened_trade_id) {
                    Ok(recorded) => {
                        inner.sink.publish_trade(&recorded);
                        trigger_sync_and_publish_portfolio(inner);
                    }
                    Err(err) => {
                        tracing::error!(symbol = %symbol, %err, "failed to record fill");
                        *tick_errors += 1;
                    }
                }
            }
            BrokerEvent::PositionUpdate(_) => {
                trigger_sync_and_publish_portfolio(inner);
            }
            BrokerEvent::Error { code, message } => {
                tracing::warn!(code = %code, message = %message, "broker reported an out-of-band error");
                *tick_errors += 1;
            }
        }
    }
}

fn trigger_sync_and_publish_portfolio(inner: &Inner) {
    match inner.sync.sync_from_callback(inner.db.as_ref(), inner.broker.as_ref(), inner.account_id) {
        Ok(_) => {
            if let Ok(positions) = inner.db.positions().list_open(inner.account_id) {
                inner.sink.publish_portfolio(inner.account_id, &positions);
            }
        }
        Err(err) => tracing::warn!(%err, "post-fill position sync failed"),
    }
}

/// Computes the realized P&L a sell fill closes or reduces (spec §3 "a sell
/// trade may carry realized P&L for the closed portion", spec §4.5 step 4
/// "track partial realized P&L on the related trade when matchable"): reads
/// the currently open position for `symbol` (as it stood before this fill,
/// since the post-fill sync hasn't run yet) and prices the closed portion
/// against its weighted-average cost. `None` when there is no open position
/// to match against.
fn realized_pnl_for_sell(inner: &Inner, symbol: &str, quantity: i64, price: rust_decimal::Decimal) -> Option<rust_decimal::Decimal> {
    let position = inner.db.positions().get_open_by_symbol(inner.account_id, symbol).ok().flatten()?;
    let closed_qty = quantity.min(position.quantity.abs());
    if closed_qty <= 0 {
        return None;
    }
    Some(position_sync::realized_pnl_for_close(position.average_price, price, closed_qty))
}

/// Finds an unmatched buy trade for `symbol` executed on `date`, used to
/// attribute a same-day sell as a day-trade (spec §3 `DayTrade`). This is
/// the approximate partial-close attribution spec.md §9 leaves to the
/// implementer: the earliest same-day buy is treated as the opening leg.
fn same_day_opening_trade(inner: &Inner, symbol: &str, date: chrono::NaiveDate) -> Option<TradeId> {
    let mut trades = inner.db.trades();
    let todays = trades.list_since(inner.account_id, date).ok()?;
    todays
        .into_iter()
        .filter(|t| t.symbol == symbol && t.side == TradeSide::Buy && t.executed_at.date_naive() == date)
        .min_by_key(|t| t.executed_at)
        .map(|t| t.id)
}

/// Reads the current account row for the risk engine's `validate` call.
/// Balance refresh (gate 1) happens separately via
/// [`RiskEngine::refresh_account`]; this just fetches the cached row.
fn account_snapshot(inner: &Inner) -> model::Account {
    inner
        .db
        .accounts()
        .get(inner.account_id)
        .unwrap_or(model::Account {
            id: inner.account_id,
            balance: rust_decimal::Decimal::ZERO,
            cash: rust_decimal::Decimal::ZERO,
            currency: "USD".to_string(),
            mode: model::AccountMode::Cash,
            balance_refreshed_at: Utc::now(),
            created_at: Utc::now(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::market_data::MarketDataFacade;
    use core_runtime::risk::RiskConfig;
    use core_runtime::strategy::{MeanReversion, StrategyInstance, StrategyKind};
    use db_sqlite::SqliteDatabase;
    use ibkr_broker::IbkrBroker;
    use model::{Account, AccountMode, BarTimeframe, NullEventSink, RuntimeError};
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    struct FixedBarsFacade {
        bars: Vec<model::Bar>,
    }

    impl MarketDataFacade for FixedBarsFacade {
        fn bars(&self, _symbol: &str, _timeframe: BarTimeframe, n: usize) -> Result<Vec<model::Bar>, RuntimeError> {
            let take = n.min(self.bars.len());
            Ok(self.bars[self.bars.len() - take..].to_vec())
        }
    }

    fn mean_reversion_trigger_bars() -> Vec<model::Bar> {
        let mut bars: Vec<model::Bar> = (0..19)
            .map(|_| model::Bar { t: Utc::now(), o: dec!(100), h: dec!(100), l: dec!(100), c: dec!(100), v: 1_000 })
            .collect();
        bars.push(model::Bar { t: Utc::now(), o: dec!(70), h: dec!(70), l: dec!(70), c: dec!(70), v: 1_000 });
        bars
    }

    fn margin_account_db() -> (SqliteDatabase, AccountId) {
        let db = SqliteDatabase::new_in_memory().expect("in-memory db opens");
        let account = db
            .accounts()
            .insert(&Account {
                id: AccountId(0),
                balance: dec!(100000),
                cash: dec!(100000),
                currency: "USD".to_string(),
                mode: AccountMode::Margin,
                balance_refreshed_at: Utc::now(),
                created_at: Utc::now(),
            })
            .expect("insert account");
        (db, account.id)
    }

    fn test_scheduler(
        db: Arc<SqliteDatabase>,
        account_id: AccountId,
        broker: Arc<dyn Broker>,
        market_data: Arc<dyn MarketDataFacade>,
    ) -> Scheduler {
        let evaluator = Arc::new(StrategyEvaluator::new(vec![StrategyInstance {
            id: "mr1".to_string(),
            kind: StrategyKind::MeanReversion(MeanReversion::default()),
            symbol: "AAPL".to_string(),
            timeframe: BarTimeframe::OneMinute,
            enabled: true,
        }]));
        let risk = Arc::new(RiskEngine::new(RiskConfig::default()));
        let sync = Arc::new(PositionSyncService::new(position_sync::SyncConfig::default()));
        let mut config = SchedulerConfig::default();
        config.market_hours_only = false;
        config.min_confidence = dec!(0.1);

        Scheduler::new(config, account_id, broker, db, market_data, evaluator, risk, sync, Arc::new(NullEventSink))
    }

    #[tokio::test]
    async fn start_stop_round_trips_through_the_state_machine() {
        let (db, account_id) = margin_account_db();
        let broker: Arc<dyn Broker> = Arc::new(IbkrBroker::new_mock());
        let market_data: Arc<dyn MarketDataFacade> = Arc::new(FixedBarsFacade { bars: mean_reversion_trigger_bars() });
        let scheduler = test_scheduler(Arc::new(db), account_id, broker, market_data);

        scheduler.start().await.expect("starts from stopped");
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.pause().expect("pauses while running");
        assert_eq!(scheduler.state(), SchedulerState::Paused);

        scheduler.resume().expect("resumes from paused");
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.stop().await.expect("stops and drains loops");
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (db, account_id) = margin_account_db();
        let broker: Arc<dyn Broker> = Arc::new(IbkrBroker::new_mock());
        let market_data: Arc<dyn MarketDataFacade> = Arc::new(FixedBarsFacade { bars: mean_reversion_trigger_bars() });
        let scheduler = test_scheduler(Arc::new(db), account_id, broker, market_data);

        scheduler.start().await.expect("first start succeeds");
        let err = scheduler.start().await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidState(_)));

        scheduler.stop().await.expect("stop still works");
    }

    #[tokio::test]
    async fn evaluation_tick_places_an_order_on_a_mean_reversion_buy_signal() {
        let (db, account_id) = margin_account_db();
        let db = Arc::new(db);
        let broker_impl = IbkrBroker::new_mock();
        broker_impl.connect("localhost", 7497, 1, StdDuration::from_secs(1)).expect("connect");
        let broker: Arc<dyn Broker> = Arc::new(broker_impl);
        let market_data: Arc<dyn MarketDataFacade> = Arc::new(FixedBarsFacade { bars: mean_reversion_trigger_bars() });

        let scheduler = test_scheduler(Arc::clone(&db), account_id, broker, market_data);
        scheduler.transition(StateTransition::Start).expect("start");
        scheduler.transition(StateTransition::Started).expect("started");

        scheduler.evaluation_tick().await;

        let status = scheduler.status();
        assert_eq!(status.stats.trades_executed, 1);

        let today = Utc::now().date_naive();
        let trades = db.trades().list_since(account_id, today).expect("list trades");
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "AAPL");
        assert_eq!(trades[0].side, model::TradeSide::Buy);
    }

    #[tokio::test]
    async fn a_sell_fill_that_partially_closes_a_position_records_realized_pnl_on_the_trade() {
        let (db, account_id) = margin_account_db();
        let db = Arc::new(db);
        db.positions()
            .insert(&model::Position {
                id: model::PositionId(0),
                account_id,
                symbol: "AAPL".to_string(),
                quantity: 10,
                average_price: dec!(100),
                current_price: dec!(100),
                unrealized_pnl: rust_decimal::Decimal::ZERO,
                unrealized_pnl_pct: rust_decimal::Decimal::ZERO,
                status: model::PositionStatus::Open,
                opened_at: Utc::now(),
                closed_at: None,
                last_synced_at: Utc::now(),
                realized_pnl: None,
            })
            .expect("insert position");

        let broker_impl = IbkrBroker::new_mock();
        broker_impl.connect("localhost", 7497, 1, StdDuration::from_secs(1)).expect("connect");
        broker_impl.mock_backend().push_event(BrokerEvent::OrderFilled {
            broker_order_id: BrokerOrderId("mock-1".to_string()),
            symbol: "AAPL".to_string(),
            side: OrderSide::Sell,
            quantity: 4,
            price: dec!(120),
            executed_at: Utc::now(),
        });
        let broker: Arc<dyn Broker> = Arc::new(broker_impl);
        let market_data: Arc<dyn MarketDataFacade> = Arc::new(FixedBarsFacade { bars: Vec::new() });

        let scheduler = test_scheduler(Arc::clone(&db), account_id, broker, market_data);
        let mut tick_errors = 0;
        drain_fills(&scheduler.0, &mut tick_errors);
        assert_eq!(tick_errors, 0);

        let today = Utc::now().date_naive();
        let trades = db.trades().list_since(account_id, today).expect("list trades");
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, model::TradeSide::Sell);
        assert_eq!(trades[0].realized_pnl, Some(dec!(80))); // (120 - 100) * 4
    }

    #[tokio::test]
    async fn evaluation_tick_is_skipped_when_broker_is_disconnected() {
        let (db, account_id) = margin_account_db();
        let broker: Arc<dyn Broker> = Arc::new(IbkrBroker::new_mock());
        let market_data: Arc<dyn MarketDataFacade> = Arc::new(FixedBarsFacade { bars: mean_reversion_trigger_bars() });
        let scheduler = test_scheduler(Arc::new(db), account_id, broker, market_data);
        scheduler.transition(StateTransition::Start).expect("start");
        scheduler.transition(StateTransition::Started).expect("started");

        scheduler.evaluation_tick().await;

        assert_eq!(scheduler.status().stats.trades_executed, 0);
    }
}
