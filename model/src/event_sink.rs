use crate::account::AccountId;
use crate::position::Position;
use crate::signal::Signal;
use crate::trade::Trade;

/// The scheduler's narrow view of the WebSocket hub (spec §4.6, §4.7).
///
/// Keeping this trait in `model` rather than having the scheduler crate
/// depend on the ws-hub crate (or vice versa) breaks the callback cycle
/// called out in spec §9: the scheduler holds an `Arc<dyn EventSink>` and
/// never needs to know about connection registries or topic fan-out: the
/// hub implements this trait and the binary wires the two together.
pub trait EventSink: Send + Sync {
    /// Publishes a non-`hold` signal (spec §4.7 `signal` message).
    fn publish_signal(&self, signal: &Signal);

    /// Publishes an executed fill (spec §4.7 `trade_executed` message).
    fn publish_trade(&self, trade: &Trade);

    /// Publishes a portfolio snapshot for `account_id` (spec §4.7
    /// `portfolio_update` message). Called after a sync or a fill.
    fn publish_portfolio(&self, account_id: AccountId, positions: &[Position]);
}

/// An [`EventSink`] that discards everything, used when `websocket.enabled`
/// is `false` (spec §6) so the scheduler never has to special-case a
/// missing hub.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish_signal(&self, _signal: &Signal) {}
    fn publish_trade(&self, _trade: &Trade) {}
    fn publish_portfolio(&self, _account_id: AccountId, _positions: &[Position]) {}
}
