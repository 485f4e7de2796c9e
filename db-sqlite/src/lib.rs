//! SQLite implementation of the trading runtime's durable store (C8).
//!
//! One Diesel-backed repository per entity in spec §3 (`accounts`,
//! `positions`, `trades`, `day_trades`, `settlement_rows`), behind the
//! `model::database` traits so the scheduler, risk engine, and position
//! sync service depend only on those traits and never on Diesel directly.

// === FINANCIAL APPLICATION SAFETY LINTS ===
// These lint rules are critical for financial applications where precision,
// safety, and reliability are paramount. Violations can lead to financial losses.

#![deny(
    // Error handling safety - force proper error handling
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,

    // Financial precision safety - prevent calculation errors
    clippy::float_arithmetic,
    clippy::arithmetic_side_effects,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,

    // Code quality enforcement
    clippy::cognitive_complexity,
    clippy::too_many_lines,
)]
// Allow unwrap and expect in test code only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// Standard Rust lints for code quality
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

mod database;
mod error;
mod schema;
mod workers;

pub use database::{OpenError, SqliteDatabase};
