//! Trading Runtime Core Crate - Market Data, Strategy, and Risk Logic
//!
//! This crate contains the strategy evaluator, shared technical indicator
//! math, and the risk/compliance engine for the trading runtime. It has no
//! network or storage dependencies of its own: callers hand it `Bar`s and
//! `Position`s and get back `Signal`s and validation results.

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
)]
// Allow unwrap and expect in test code only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// Standard Rust lints for code quality
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod indicators;
pub mod market_data;
pub mod risk;
pub mod strategy;
