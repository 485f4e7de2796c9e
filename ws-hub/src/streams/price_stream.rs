//! `PriceStream` (spec §4.7): polls the broker's market data for a fixed
//! symbol set on `price_update_interval` and broadcasts a single batched
//! `price_update` message for every symbol whose last price changed.

use crate::hub::Hub;
use crate::messages::{PriceUpdateMessage, SymbolPrice};
use model::{Broker, Topic};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs the price-polling loop until `token` is cancelled.
pub async fn run(
    hub: Arc<Hub>,
    broker: Arc<dyn Broker>,
    symbols: Vec<String>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut last_prices: HashMap<String, Decimal> = HashMap::new();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = token.cancelled() => break,
        }

        poll_once(&hub, broker.as_ref(), &symbols, &mut last_prices);
    }
}

/// One polling tick, factored out of [`run`] so it can be exercised
/// directly in tests (the same "test the tick, not the loop" idiom the
/// scheduler's `evaluation_tick` uses). Symbols whose `market_data` call
/// fails this tick are skipped, not fatal to the loop.
fn poll_once(
    hub: &Hub,
    broker: &dyn Broker,
    symbols: &[String],
    last_prices: &mut HashMap<String, Decimal>,
) {
    if !broker.is_connected() {
        return;
    }

    let mut changed = HashMap::new();
    for symbol in symbols {
        let snapshot = match broker.market_data(symbol) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(symbol = %symbol, %err, "price stream: market data unavailable this tick");
                continue;
            }
        };

        let previous = last_prices.get(symbol).copied();
        if previous == Some(snapshot.last) {
            continue;
        }

        let change = previous
            .map(|p| snapshot.last.checked_sub(p).unwrap_or(Decimal::ZERO))
            .unwrap_or(Decimal::ZERO);
        let change_pct = match previous {
            Some(p) if !p.is_zero() => change.checked_div(p).unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        };

        changed.insert(
            symbol.clone(),
            SymbolPrice {
                price: snapshot.last,
                change,
                change_pct,
                volume: Some(snapshot.volume),
                high: Some(snapshot.high),
                low: Some(snapshot.low),
                open: None,
                close: None,
            },
        );
        last_prices.insert(symbol.clone(), snapshot.last);
    }

    if changed.is_empty() {
        return;
    }

    let message = PriceUpdateMessage::new(changed);
    match serde_json::to_string(&message) {
        Ok(json) => hub.broadcast(Topic::PriceUpdates, &json),
        Err(err) => warn!(%err, "price stream: failed to serialize price_update"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use chrono::Utc;
    use model::{
        AccountSummary, BarTimeframe, BrokerConnectError, BrokerEvent, BrokerPosition,
        ConnectionState, MarketSnapshot, OrderSide, OrderType, RuntimeError,
    };
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StepBroker {
        calls: AtomicUsize,
        prices: Vec<Decimal>,
        connected: bool,
    }

    impl Broker for StepBroker {
        fn connect(&self, _: &str, _: u16, _: u32, _: Duration) -> Result<(), BrokerConnectError> {
            Ok(())
        }
        fn disconnect(&self) {}
        fn connection_state(&self) -> ConnectionState {
            if self.connected {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            }
        }
        fn place_order(&self, _: &str, _: OrderSide, _: i64, _: OrderType) -> Result<model::BrokerOrderId, RuntimeError> {
            unreachable!("not used by this test")
        }
        fn cancel_order(&self, _: &model::BrokerOrderId) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn positions(&self) -> Result<Vec<BrokerPosition>, RuntimeError> {
            Ok(Vec::new())
        }
        fn account_summary(&self) -> Result<AccountSummary, RuntimeError> {
            Ok(AccountSummary::default())
        }
        fn market_data(&self, _symbol: &str) -> Result<MarketSnapshot, RuntimeError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let last_idx = self.prices.len().saturating_sub(1);
            let price = self.prices.get(idx.min(last_idx)).copied().unwrap_or(dec!(100));
            Ok(MarketSnapshot {
                last: price,
                bid: price,
                ask: price,
                high: price,
                low: price,
                volume: 1000,
                as_of: Utc::now(),
            })
        }
        fn bars(&self, _: &str, _: BarTimeframe, _: usize) -> Result<Vec<model::Bar>, RuntimeError> {
            Ok(Vec::new())
        }
        fn poll_events(&self, _max: usize) -> Vec<BrokerEvent> {
            Vec::new()
        }
    }

    #[test]
    fn broadcasts_only_on_price_change() {
        let hub = Hub::new(HubConfig::default());
        let mut client = hub.accept().unwrap();
        let broker = StepBroker {
            calls: AtomicUsize::new(0),
            prices: vec![dec!(100), dec!(100), dec!(105)],
            connected: true,
        };
        let symbols = vec!["AAPL".to_string()];
        let mut last_prices = HashMap::new();

        poll_once(&hub, &broker, &symbols, &mut last_prices); // 100: first sighting, broadcasts
        poll_once(&hub, &broker, &symbols, &mut last_prices); // 100 again: no change, no broadcast
        poll_once(&hub, &broker, &symbols, &mut last_prices); // 105: changed, broadcasts

        let mut messages = Vec::new();
        while let Ok(message) = client.outbox.try_recv() {
            messages.push(message);
        }
        assert_eq!(messages.len(), 2);
        assert!(messages[1].contains("\"AAPL\""));
    }

    #[test]
    fn skips_the_tick_entirely_when_disconnected() {
        let hub = Hub::new(HubConfig::default());
        let mut client = hub.accept().unwrap();
        let broker = StepBroker {
            calls: AtomicUsize::new(0),
            prices: vec![dec!(100)],
            connected: false,
        };
        let symbols = vec!["AAPL".to_string()];
        let mut last_prices = HashMap::new();

        poll_once(&hub, &broker, &symbols, &mut last_prices);

        assert!(client.outbox.try_recv().is_err());
    }
}
