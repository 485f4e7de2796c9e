//! Position Sync Service (C5, spec §4.5): reconciles broker-reported
//! positions into the durable store.
//!
//! The store is the single source of truth about "what we hold" between
//! syncs; the broker is the source of truth during a sync pass (spec §3).
//! [`PositionSyncService::sync`] performs one reconciliation pass, guarded
//! by a per-service lock (testable property "at-most-one sync", spec §8)
//! and debounced when triggered from a broker callback (spec §4.5, §5).

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

mod reconcile;
mod service;

pub use reconcile::{reconcile, realized_pnl_for_close, PartialClose, ReconcileOutcome};
pub use service::{PositionSyncService, SyncConfig, SyncOutcome, SyncStats};
