use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Error taxonomy shared across the workspace (spec §7).
///
/// This is a name, not a single concrete type: individual crates define
/// their own `thiserror` enums for their RPC-shaped APIs and map into
/// this taxonomy at the edges (the scheduler's tick loop, the sync
/// service's stats, the WebSocket hub's `error` frame) so that cross-crate
/// reporting (stats counters, log fields) has one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Upstream (broker or market data) cannot serve the request now. Retried next cycle.
    Unavailable,
    /// A bounded wait elapsed. Retried next cycle.
    Timeout,
    /// Broker session lost; scheduler/sync short-circuit until reconnect.
    Disconnected,
    /// Broker reports our state is inconsistent. Not retried.
    Conflict,
    /// Input failed validation. Fatal for this request; never retried.
    InvalidRequest,
    /// The risk/compliance engine returned `blocked`. Counted, not retried this cycle.
    BlockedByRisk,
    /// The sync service detected a position mismatch between store and broker.
    DataInconsistency,
    /// A capacity limit was reached (WebSocket connections, broker event queue). Back-pressured.
    Capacity,
    /// An uncaught defect. The cycle continues; incremented in error stats.
    Internal,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Disconnected => "disconnected",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::BlockedByRisk => "blocked_by_risk",
            ErrorKind::DataInconsistency => "data_inconsistency",
            ErrorKind::Capacity => "capacity",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// A generic runtime error carrying a taxonomy kind plus a message, used at
/// crate boundaries that need to report into the shared vocabulary without
/// defining their own enum (e.g. the scheduler's per-tick error counters).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    /// Taxonomy classification.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl RuntimeError {
    /// Builds a new error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
        }
    }
}
