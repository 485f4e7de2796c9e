//! A fully in-process, deterministic [`super::GatewayBackend`].
//!
//! Used by this crate's own tests and, via [`crate::IbkrBroker`]'s
//! `new_mock` constructor, by the scheduler/position-sync/ws-hub crates'
//! tests (spec §8: "given a deterministic fake broker and strategy,
//! identical bars yield identical position state"). No socket is opened;
//! state lives entirely in a `Mutex` and is driven by the test through
//! [`MockGatewayBackend`]'s setup methods.

use model::{
    AccountSummary, Bar, BarTimeframe, BrokerConnectError, BrokerEvent, BrokerOrderId,
    BrokerPosition, ErrorKind, MarketSnapshot, OrderSide, OrderType, RuntimeError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::GatewayBackend;

/// In-memory deterministic double for [`GatewayBackend`].
#[derive(Debug, Default)]
pub struct MockGatewayBackend {
    connected: AtomicBool,
    next_order_id: AtomicU64,
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    positions: Vec<BrokerPosition>,
    account: AccountSummary,
    market_data: std::collections::HashMap<String, MarketSnapshot>,
    bars: std::collections::HashMap<(String, BarTimeframe), Vec<Bar>>,
    pending_events: VecDeque<BrokerEvent>,
    fail_next_connect: bool,
    unreachable: bool,
}

impl MockGatewayBackend {
    /// Builds a backend with zeroed account/positions, ready to connect.
    pub fn new() -> Self {
        MockGatewayBackend::default()
    }

    /// Seeds the positions snapshot returned by `positions()`.
    pub fn set_positions(&self, positions: Vec<BrokerPosition>) {
        if let Ok(mut state) = self.state.lock() {
            state.positions = positions;
        }
    }

    /// Seeds the account summary returned by `account_summary()`.
    pub fn set_account_summary(&self, summary: AccountSummary) {
        if let Ok(mut state) = self.state.lock() {
            state.account = summary;
        }
    }

    /// Seeds the market snapshot for `symbol`.
    pub fn set_market_data(&self, symbol: &str, snapshot: MarketSnapshot) {
        if let Ok(mut state) = self.state.lock() {
            state.market_data.insert(symbol.to_string(), snapshot);
        }
    }

    /// Seeds the bar history for `symbol`/`timeframe`.
    pub fn set_bars(&self, symbol: &str, timeframe: BarTimeframe, bars: Vec<Bar>) {
        if let Ok(mut state) = self.state.lock() {
            state.bars.insert((symbol.to_string(), timeframe), bars);
        }
    }

    /// Queues an event to be returned by the next `drain_events` call.
    pub fn push_event(&self, event: BrokerEvent) {
        if let Ok(mut state) = self.state.lock() {
            state.pending_events.push_back(event);
        }
    }

    /// Makes the next `handshake` call fail with `Unreachable`.
    pub fn fail_next_connect(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next_connect = true;
        }
    }

    /// Makes every subsequent `probe` call report the session as dead,
    /// simulating a lost connection for reconnect-supervisor tests.
    pub fn simulate_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut state) = self.state.lock() {
            state.unreachable = true;
        }
    }

    /// Clears the simulated outage so the next `handshake` succeeds again.
    pub fn restore_connectivity(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.unreachable = false;
        }
    }
}

impl GatewayBackend for MockGatewayBackend {
    fn handshake(&self, _client_id: u32, _timeout: Duration) -> Result<(), BrokerConnectError> {
        let mut state = self.state.lock().map_err(|_| BrokerConnectError::Unreachable)?;
        if state.unreachable {
            return Err(BrokerConnectError::Unreachable);
        }
        if state.fail_next_connect {
            state.fail_next_connect = false;
            return Err(BrokerConnectError::Auth);
        }
        drop(state);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn probe(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && !self.state.lock().map(|s| s.unreachable).unwrap_or(true)
    }

    fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: i64,
        _order_type: OrderType,
    ) -> Result<BrokerOrderId, RuntimeError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "mock gateway not connected"));
        }
        if qty <= 0 {
            return Err(RuntimeError::new(ErrorKind::InvalidRequest, "quantity must be positive"));
        }
        let id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        let order_id = BrokerOrderId(format!("mock-{id}"));

        if let Ok(mut state) = self.state.lock() {
            let price = state
                .market_data
                .get(symbol)
                .map(|m| m.last)
                .unwrap_or_default();
            state.pending_events.push_back(BrokerEvent::OrderFilled {
                broker_order_id: order_id.clone(),
                symbol: symbol.to_string(),
                side,
                quantity: qty,
                price,
                executed_at: chrono::Utc::now(),
            });
        }
        Ok(order_id)
    }

    fn cancel_order(&self, _broker_order_id: &BrokerOrderId) -> Result<(), RuntimeError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "mock gateway not connected"));
        }
        Ok(())
    }

    fn positions(&self) -> Result<Vec<BrokerPosition>, RuntimeError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "mock gateway not connected"));
        }
        Ok(self.state.lock().map(|s| s.positions.clone()).unwrap_or_default())
    }

    fn account_summary(&self) -> Result<AccountSummary, RuntimeError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "mock gateway not connected"));
        }
        Ok(self.state.lock().map(|s| s.account).unwrap_or_default())
    }

    fn market_data(&self, symbol: &str) -> Result<MarketSnapshot, RuntimeError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "mock gateway not connected"));
        }
        self.state
            .lock()
            .ok()
            .and_then(|s| s.market_data.get(symbol).copied())
            .ok_or_else(|| RuntimeError::new(ErrorKind::Unavailable, format!("no market data seeded for {symbol}")))
    }

    fn bars(&self, symbol: &str, timeframe: BarTimeframe, n: usize) -> Result<Vec<Bar>, RuntimeError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "mock gateway not connected"));
        }
        let all = self
            .state
            .lock()
            .map(|s| s.bars.get(&(symbol.to_string(), timeframe)).cloned().unwrap_or_default())
            .unwrap_or_default();
        let take = n.min(all.len());
        Ok(all[all.len() - take..].to_vec())
    }

    fn drain_events(&self) -> Vec<BrokerEvent> {
        self.state
            .lock()
            .map(|mut s| s.pending_events.drain(..).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_order_requires_connection() {
        let backend = MockGatewayBackend::new();
        let err = backend
            .place_order("AAPL", OrderSide::Buy, 5, OrderType::Market)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Disconnected);
    }

    #[test]
    fn place_order_emits_a_fill_event() {
        let backend = MockGatewayBackend::new();
        backend.handshake(1, Duration::from_secs(1)).unwrap();
        backend.place_order("AAPL", OrderSide::Buy, 5, OrderType::Market).unwrap();
        let events = backend.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], BrokerEvent::OrderFilled { .. }));
    }

    #[test]
    fn simulated_disconnect_fails_the_probe() {
        let backend = MockGatewayBackend::new();
        backend.handshake(1, Duration::from_secs(1)).unwrap();
        assert!(backend.probe());
        backend.simulate_disconnect();
        assert!(!backend.probe());
    }
}
