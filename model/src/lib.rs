//! Trading Runtime Model Crate - Core Domain Models
//!
//! This crate defines the domain model shared by every other crate in the
//! workspace: accounts, positions, trades, settlement and day-trade
//! bookkeeping, the ephemeral signal/subscription types produced by the
//! strategy evaluator, and the `Broker`/`Database` traits that the
//! concrete broker and persistence crates implement.

// === FINANCIAL APPLICATION SAFETY LINTS ===
// These lint rules are critical for financial applications where precision,
// safety, and reliability are paramount. Violations can lead to financial losses.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::float_arithmetic,
    clippy::arithmetic_side_effects,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

/// Opaque store-assigned identifiers.
pub mod ids;

/// Account entity and cash/margin classification.
pub mod account;
/// Position entity and lifecycle.
pub mod position;
/// Trade (fill) entity.
pub mod trade;
/// Day-trade bookkeeping for PDT enforcement.
pub mod day_trade;
/// Settlement row bookkeeping for T+2 / GFV enforcement.
pub mod settlement;
/// Rolling trade-frequency counters.
pub mod frequency;
/// Ephemeral strategy signal type.
pub mod signal;
/// Ephemeral WebSocket subscription type.
pub mod subscription;
/// Market data (OHLCV bar) types.
pub mod market_data;
/// Broker integration trait and error taxonomy.
pub mod broker;
/// Durable store repository traits.
pub mod database;
/// Error taxonomy shared across crates (spec §7).
pub mod error;
/// Scheduler-to-hub publish interface (spec §4.6, §4.7), kept here to break
/// a crate-level dependency cycle between the scheduler and ws-hub crates.
pub mod event_sink;

pub use account::{Account, AccountId, AccountMode};
pub use broker::{
    AccountSummary, Broker, BrokerConnectError, BrokerEvent, BrokerPosition, ConnectionState,
    MarketSnapshot, OrderSide, OrderType,
};
pub use database::{
    AccountRepository, DatabaseFactory, DayTradeRepository, PositionRepository,
    SettlementRepository, TradeRepository, TxError,
};
pub use day_trade::{DayTrade, DayTradeId};
pub use error::{ErrorKind, RuntimeError};
pub use event_sink::{EventSink, NullEventSink};
pub use frequency::TradeFrequencyCounter;
pub use ids::{BrokerOrderId, Id};
pub use market_data::{Bar, BarTimeframe};
pub use position::{Position, PositionId, PositionStatus};
pub use settlement::{add_business_days, SettlementRow, SettlementRowId};
pub use signal::{Signal, SignalKind};
pub use subscription::{Subscription, Topic};
pub use trade::{Trade, TradeId, TradeSide};
