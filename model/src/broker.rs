use crate::error::RuntimeError;
use crate::ids::BrokerOrderId;
use crate::market_data::{Bar, BarTimeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;
use thiserror::Error;

/// Side of an order submission (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    /// Buy to open or cover.
    Buy,
    /// Sell to open short or reduce/close a long.
    Sell,
}

impl Display for OrderSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Order type (spec §4.1). Limit orders carry a limit price.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderType {
    /// Execute immediately at the best available price.
    Market,
    /// Execute only at `limit_price` or better.
    Limit {
        /// Limit price.
        limit_price: Decimal,
    },
}

/// Snapshot of a broker-reported position (spec §4.1 `positions()`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BrokerPosition {
    /// Ticker symbol.
    pub symbol: String,
    /// Signed quantity held.
    pub qty: i64,
    /// Average entry price as known to the broker.
    pub avg_price: Decimal,
    /// Current market price as known to the broker.
    pub market_price: Decimal,
    /// Broker-computed unrealized P&L.
    pub unrealized_pnl: Decimal,
}

/// Broker account summary (spec §4.1 `account_summary()`).
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct AccountSummary {
    /// Net liquidation value.
    pub net_liquidation: Decimal,
    /// Total cash.
    pub total_cash: Decimal,
}

/// Best-effort market snapshot for a symbol (spec §4.1 `market_data()`).
///
/// May carry stale values outside market hours; that is an accepted
/// broker-side behavior, not an error condition.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarketSnapshot {
    /// Last trade price.
    pub last: Decimal,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Session volume.
    pub volume: u64,
    /// When this snapshot was captured.
    pub as_of: DateTime<Utc>,
}

/// Current connection state, observable by callers without issuing an RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No active session.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Session established and healthy.
    Connected,
    /// Session lost; supervisor is retrying with backoff.
    Reconnecting,
}

/// Failure modes for `Broker::connect` (spec §4.1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerConnectError {
    /// The gateway host/port could not be reached.
    #[error("broker gateway unreachable")]
    Unreachable,
    /// The gateway rejected the handshake.
    #[error("broker authentication failed")]
    Auth,
    /// Another session is already registered under this client id.
    #[error("client id already in use")]
    ClientIdConflict,
    /// The connect attempt did not complete within the configured timeout.
    #[error("connect timed out")]
    Timeout,
}

/// A fill, position update, or error event emitted from the broker's session
/// thread (spec §4.1). Delivered to consumers through a bounded queue so the
/// session loop itself is never blocked by a slow consumer (spec §5).
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// An order was filled (fully or partially).
    OrderFilled {
        /// Broker-native order id.
        broker_order_id: BrokerOrderId,
        /// Ticker symbol.
        symbol: String,
        /// Side of the fill.
        side: OrderSide,
        /// Filled quantity.
        quantity: i64,
        /// Fill price.
        price: Decimal,
        /// Broker-reported execution timestamp.
        executed_at: DateTime<Utc>,
    },
    /// A position changed (broker-reported, not yet reconciled into the store).
    PositionUpdate(BrokerPosition),
    /// An out-of-band error surfaced by the session (e.g. a rejected order).
    Error {
        /// Broker-native error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

/// Trait for broker gateway integrations (spec §4.1).
///
/// Implementations own a single live session per `client_id`; RPCs below
/// serialize through the session's request mutex to match the underlying
/// gateway's single-threaded wire ABI (spec §5). Every RPC is bounded by a
/// default 10s timeout and never blocks indefinitely.
pub trait Broker: Send + Sync {
    /// Opens a session. At most one active session per `client_id`.
    fn connect(
        &self,
        host: &str,
        port: u16,
        client_id: u32,
        timeout: Duration,
    ) -> Result<(), BrokerConnectError>;

    /// Closes the session, if any.
    fn disconnect(&self);

    /// Current connection state, observable without an RPC round-trip.
    fn connection_state(&self) -> ConnectionState;

    /// True iff `connection_state() == Connected`. Convenience for callers
    /// that only need a skip-this-cycle decision (scheduler, sync service).
    fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Submits an order. Guarantees submission, not fill.
    fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: i64,
        order_type: OrderType,
    ) -> Result<BrokerOrderId, RuntimeError>;

    /// Cancels a previously submitted order.
    fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), RuntimeError>;

    /// Snapshot of all currently held positions.
    fn positions(&self) -> Result<Vec<BrokerPosition>, RuntimeError>;

    /// Snapshot of account-level balances.
    fn account_summary(&self) -> Result<AccountSummary, RuntimeError>;

    /// Best-effort current market snapshot for `symbol`.
    fn market_data(&self, symbol: &str) -> Result<MarketSnapshot, RuntimeError>;

    /// Recent OHLCV bars for `symbol`/`timeframe`, used by the market data facade (C2).
    fn bars(&self, symbol: &str, timeframe: BarTimeframe, n: usize) -> Result<Vec<Bar>, RuntimeError>;

    /// Drains up to `max` pending [`BrokerEvent`]s from the session's bounded
    /// event queue (spec §4.1, §5) without blocking. Callers (the scheduler's
    /// fill handling, the sync service's debounce, the WebSocket hub's
    /// `TradePublisher`/`PortfolioStream`) poll this on their own cadence
    /// rather than being invoked from the session thread directly, so a slow
    /// consumer can never stall the reader. Implementations that do not emit
    /// events (e.g. simple test doubles) may rely on this default.
    fn poll_events(&self, max: usize) -> Vec<BrokerEvent> {
        let _ = max;
        Vec::new()
    }
}
