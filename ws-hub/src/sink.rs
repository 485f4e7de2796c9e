//! [`model::EventSink`] implementation that fans scheduler-produced events
//! out through the hub (spec §4.6, §4.7).
//!
//! This is the `SignalStream`/`TradePublisher`/fill-triggered half of
//! `PortfolioStream` described in spec §4.7: rather than a second
//! subscriber polling the evaluator or the broker's event queue, the
//! scheduler already funnels every non-`hold` signal and every fill
//! through its `Arc<dyn EventSink>` (spec §9's "keep callbacks synchronous
//! and cheap" redesign flag), so the hub's side of that contract is simply
//! "serialize and broadcast". The independent polling half of
//! `PortfolioStream` (interval-driven, change-detected) lives in
//! `streams::portfolio_stream`.

use crate::hub::Hub;
use crate::messages::{PortfolioUpdateMessage, SignalMessage, TradeExecutedMessage};
use model::{AccountId, EventSink, Position, Signal, Topic, Trade};
use std::sync::Arc;
use tracing::warn;

/// Wraps a [`Hub`] as the scheduler's [`EventSink`].
#[derive(Debug, Clone)]
pub struct HubEventSink {
    hub: Arc<Hub>,
}

impl HubEventSink {
    /// Builds a sink broadcasting through `hub`.
    pub fn new(hub: Arc<Hub>) -> Self {
        HubEventSink { hub }
    }
}

impl EventSink for HubEventSink {
    fn publish_signal(&self, signal: &Signal) {
        broadcast_json(&self.hub, Topic::Signals, &SignalMessage::from(signal));
    }

    fn publish_trade(&self, trade: &Trade) {
        broadcast_json(&self.hub, Topic::Trades, &TradeExecutedMessage::from(trade));
    }

    fn publish_portfolio(&self, _account_id: AccountId, positions: &[Position]) {
        broadcast_json(&self.hub, Topic::Portfolio, &PortfolioUpdateMessage::new(positions));
    }
}

fn broadcast_json<T: serde::Serialize>(hub: &Hub, topic: Topic, message: &T) {
    match serde_json::to_string(message) {
        Ok(json) => hub.broadcast(topic, &json),
        Err(err) => warn!(%err, %topic, "failed to serialize websocket message, dropping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use rust_decimal_macros::dec;

    #[test]
    fn publish_signal_broadcasts_to_subscribed_clients() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let mut client = hub.accept().unwrap();
        let sink = HubEventSink::new(Arc::clone(&hub));

        let mut signal = Signal::hold("AAPL", "s1", dec!(150));
        signal.kind = model::SignalKind::Buy;
        sink.publish_signal(&signal);

        let received = client.outbox.try_recv().expect("message queued");
        assert!(received.contains("\"type\":\"signal\""));
        assert!(received.contains("AAPL"));
    }
}
