//! WebSocket Hub & Streams (C7, spec §4.7).
//!
//! Owns the connection registry and topic fan-out ([`hub::Hub`]), the
//! `/ws` axum endpoint ([`server::router`]), the scheduler-facing
//! [`model::EventSink`] implementation ([`sink::HubEventSink`]), and the
//! two interval-driven background streams ([`streams::price_stream`],
//! [`streams::portfolio_stream`]).

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

/// Typed `websocket.*` configuration.
pub mod config;
/// Connection registry and topic fan-out.
pub mod hub;
/// Outbound message schemas (spec §4.7 bit-exact fields).
pub mod messages;
/// The `/ws` axum endpoint.
pub mod server;
/// Scheduler-facing `EventSink` implementation.
pub mod sink;
/// Interval-driven background publisher tasks.
pub mod streams;

pub use config::HubConfig;
pub use hub::{spawn_keepalive_sweep, Hub, HubError};
pub use sink::HubEventSink;
