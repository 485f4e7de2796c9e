//! Broker Client (C1): session management over an Interactive-Brokers-style
//! gateway, order placement, position/account/market-data queries, and a
//! bounded event queue feeding fills and position updates to the rest of
//! the runtime (spec §4.1).
//!
//! [`IbkrBroker`] implements `model::Broker` against a pluggable
//! [`backend::GatewayBackend`]: [`backend::TcpJsonGatewayBackend`] for a
//! real gateway connection, [`backend::MockGatewayBackend`] for
//! deterministic tests here and in downstream crates (scheduler,
//! position-sync, ws-hub).

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

/// Wire-level gateway backends (real TCP/JSON session + deterministic mock).
pub mod backend;
/// Bounded event queue feeding the session's callback stream.
pub mod events;
/// The `Broker` implementation itself.
pub mod session;
/// Reconnect supervisor.
pub mod supervisor;

pub use backend::{GatewayBackend, MockGatewayBackend, TcpJsonGatewayBackend};
pub use session::{IbkrBroker, DEFAULT_RPC_TIMEOUT};
