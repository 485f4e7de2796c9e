//! Broker client session (C1, spec §4.1): the `Broker` trait's concrete
//! implementation, generic over a [`GatewayBackend`] so the same
//! supervisor/event-queue/timeout machinery drives both a real TCP/JSON
//! gateway and, in tests, [`crate::backend::MockGatewayBackend`].

use crate::backend::{GatewayBackend, MockGatewayBackend, TcpJsonGatewayBackend};
use crate::events::BoundedEventQueue;
use crate::supervisor::Supervisor;
use model::{
    AccountSummary, Bar, BarTimeframe, Broker, BrokerConnectError, BrokerEvent, BrokerOrderId,
    BrokerPosition, ConnectionState, ErrorKind, MarketSnapshot, OrderSide, OrderType, RuntimeError,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default bound on any single broker RPC (spec §4.1, §5).
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// The broker client (C1). `B` is the wire-level backend; see
/// [`IbkrBroker::new`] for the real TCP/JSON gateway and
/// [`IbkrBroker::new_mock`] for the deterministic test double.
pub struct IbkrBroker<B: GatewayBackend = TcpJsonGatewayBackend> {
    backend: Arc<B>,
    state: Arc<Mutex<ConnectionState>>,
    events: Arc<BoundedEventQueue>,
    supervisor: Mutex<Option<Supervisor>>,
    rpc_timeout: Duration,
}

impl<B: GatewayBackend> std::fmt::Debug for IbkrBroker<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IbkrBroker")
            .field("state", &self.connection_state())
            .finish()
    }
}

impl IbkrBroker<TcpJsonGatewayBackend> {
    /// Builds a broker client targeting a real gateway at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        IbkrBroker::with_backend(TcpJsonGatewayBackend::new(host, port, DEFAULT_RPC_TIMEOUT))
    }
}

impl IbkrBroker<MockGatewayBackend> {
    /// Builds a broker client over a fresh, disconnected
    /// [`MockGatewayBackend`], for deterministic tests in this and
    /// downstream crates.
    pub fn new_mock() -> Self {
        IbkrBroker::with_backend(MockGatewayBackend::new())
    }

    /// The mock backend, for seeding positions/bars/market data/events
    /// from test code before or after connecting.
    pub fn mock_backend(&self) -> &MockGatewayBackend {
        &self.backend
    }
}

impl<B: GatewayBackend + 'static> IbkrBroker<B> {
    /// Builds a broker client over an arbitrary backend.
    pub fn with_backend(backend: B) -> Self {
        IbkrBroker {
            backend: Arc::new(backend),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            events: Arc::new(BoundedEventQueue::new()),
            supervisor: Mutex::new(None),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    fn set_state(&self, next: ConnectionState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = next;
        }
    }

    fn pump_backend_events(&self) {
        for event in self.backend.drain_events() {
            self.events.push(event);
        }
    }
}

impl<B: GatewayBackend + 'static> Broker for IbkrBroker<B> {
    fn connect(
        &self,
        host: &str,
        port: u16,
        client_id: u32,
        timeout: Duration,
    ) -> Result<(), BrokerConnectError> {
        let _ = (host, port); // backend already targets a fixed host/port; kept for trait parity.
        self.set_state(ConnectionState::Connecting);

        match self.backend.handshake(client_id, timeout) {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                let supervisor = Supervisor::spawn(
                    Arc::clone(&self.backend),
                    Arc::clone(&self.state),
                    client_id,
                    timeout,
                );
                if let Ok(mut guard) = self.supervisor.lock() {
                    *guard = Some(supervisor);
                }
                Ok(())
            }
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    fn disconnect(&self) {
        self.backend.close();
        self.set_state(ConnectionState::Disconnected);
        if let Ok(mut guard) = self.supervisor.lock() {
            if let Some(supervisor) = guard.take() {
                supervisor.stop();
            }
        }
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.lock().map(|s| *s).unwrap_or(ConnectionState::Disconnected)
    }

    fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: i64,
        order_type: OrderType,
    ) -> Result<BrokerOrderId, RuntimeError> {
        if qty == 0 {
            return Err(RuntimeError::new(ErrorKind::InvalidRequest, "order quantity must be non-zero"));
        }
        if !self.is_connected() {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "broker not connected"));
        }
        let result = self.backend.place_order(symbol, side, qty, order_type);
        self.pump_backend_events();
        result
    }

    fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), RuntimeError> {
        if !self.is_connected() {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "broker not connected"));
        }
        self.backend.cancel_order(broker_order_id)
    }

    fn positions(&self) -> Result<Vec<BrokerPosition>, RuntimeError> {
        if !self.is_connected() {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "broker not connected"));
        }
        self.backend.positions()
    }

    fn account_summary(&self) -> Result<AccountSummary, RuntimeError> {
        if !self.is_connected() {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "broker not connected"));
        }
        self.backend.account_summary()
    }

    fn market_data(&self, symbol: &str) -> Result<MarketSnapshot, RuntimeError> {
        if !self.is_connected() {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "broker not connected"));
        }
        self.backend.market_data(symbol)
    }

    fn bars(&self, symbol: &str, timeframe: BarTimeframe, n: usize) -> Result<Vec<Bar>, RuntimeError> {
        if !self.is_connected() {
            return Err(RuntimeError::new(ErrorKind::Disconnected, "broker not connected"));
        }
        self.backend.bars(symbol, timeframe, n)
    }

    fn poll_events(&self, max: usize) -> Vec<BrokerEvent> {
        self.pump_backend_events();
        self.events.drain(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::BrokerEvent;
    use std::time::Duration;

    fn connected_mock() -> IbkrBroker<MockGatewayBackend> {
        let broker = IbkrBroker::new_mock();
        broker.connect("localhost", 7497, 1, Duration::from_secs(1)).unwrap();
        broker
    }

    #[test]
    fn connect_failure_leaves_state_disconnected() {
        let broker = IbkrBroker::new_mock();
        broker.mock_backend().fail_next_connect();
        let err = broker
            .connect("localhost", 7497, 1, Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err, BrokerConnectError::Auth);
        assert_eq!(broker.connection_state(), ConnectionState::Disconnected);
        assert!(!broker.is_connected());
    }

    #[test]
    fn rpcs_fail_fast_when_disconnected() {
        let broker = IbkrBroker::new_mock();
        let err = broker.positions().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Disconnected);
    }

    #[test]
    fn place_order_surfaces_a_fill_event_through_poll_events() {
        let broker = connected_mock();
        broker
            .place_order("AAPL", OrderSide::Buy, 5, OrderType::Market)
            .unwrap();
        let events = broker.poll_events(10);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], BrokerEvent::OrderFilled { .. }));
    }

    #[test]
    fn zero_quantity_order_is_invalid_request() {
        let broker = connected_mock();
        let err = broker
            .place_order("AAPL", OrderSide::Buy, 0, OrderType::Market)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }

    #[test]
    fn disconnect_stops_the_supervisor_and_clears_state() {
        let broker = connected_mock();
        broker.disconnect();
        assert_eq!(broker.connection_state(), ConnectionState::Disconnected);
        assert!(!broker.is_connected());
    }
}
