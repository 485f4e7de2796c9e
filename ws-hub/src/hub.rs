//! Connection registry and topic fan-out (spec §4.7 "Hub").
//!
//! The registry is guarded by a mutex and iteration always takes a
//! snapshot before doing any I/O (spec §5: "Client registry in C7 ...
//! iteration makes a snapshot before sending to avoid holding the lock
//! over I/O"), mirroring the teacher's single-connection-guarded-by-mutex
//! pattern generalized from one shared resource to many per-client ones.

use crate::config::HubConfig;
use chrono::Utc;
use model::Topic;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Bound on a single client's outbound mailbox. A client slow enough to
/// fill this is treated the same as a dead one: evicted on the next send.
pub const CLIENT_MAILBOX_CAPACITY: usize = 256;

/// Upper bound on a single WebSocket send (spec §5).
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Failure modes for [`Hub::accept`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// `max_connections` is already reached.
    #[error("websocket connection limit reached")]
    Capacity,
}

/// One connected client's fan-out handle, as seen from the registry side.
#[derive(Debug)]
struct ClientHandle {
    sender: mpsc::Sender<String>,
    topics: HashSet<Topic>,
    last_pong: Arc<Mutex<Instant>>,
}

/// A connected client, as returned to the transport layer (spec §4.7 `accept`).
#[derive(Debug)]
pub struct AcceptedClient {
    /// Hub-assigned UUID.
    pub client_id: String,
    /// Receives every JSON frame queued for this client; the transport layer
    /// (the axum `/ws` handler) drains this into the socket.
    pub outbox: mpsc::Receiver<String>,
    /// Shared with the hub's keep-alive sweep; the transport layer updates
    /// this on every client pong/text frame.
    pub last_pong: Arc<Mutex<Instant>>,
}

/// The connection registry and topic fan-out (C7 "Hub", spec §4.7).
#[derive(Debug)]
pub struct Hub {
    clients: Mutex<HashMap<String, ClientHandle>>,
    config: HubConfig,
}

impl Hub {
    /// Builds an empty hub.
    pub fn new(config: HubConfig) -> Self {
        Hub {
            clients: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Current number of connected clients.
    pub fn connection_count(&self) -> usize {
        self.lock_clients().len()
    }

    /// Registers a new client, auto-subscribed to every topic (MVP default,
    /// spec §3, §4.7). Returns `error(capacity)` at `max_connections`.
    pub fn accept(&self) -> Result<AcceptedClient, HubError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let mut clients = self.lock_clients();
        if clients.len() >= self.config.max_connections {
            return Err(HubError::Capacity);
        }

        let (tx, rx) = mpsc::channel(CLIENT_MAILBOX_CAPACITY);
        let last_pong = Arc::new(Mutex::new(Instant::now()));
        clients.insert(
            client_id.clone(),
            ClientHandle {
                sender: tx,
                topics: Topic::all().into_iter().collect(),
                last_pong: Arc::clone(&last_pong),
            },
        );
        debug!(client_id = %client_id, total = clients.len(), "websocket client accepted");

        Ok(AcceptedClient {
            client_id,
            outbox: rx,
            last_pong,
        })
    }

    /// Removes a client from the registry, dropping its mailbox sender so
    /// the transport task's receive loop ends.
    pub fn close(&self, client_id: &str) {
        if self.lock_clients().remove(client_id).is_some() {
            debug!(client_id = %client_id, "websocket client closed");
        }
    }

    /// Sends `payload` to every client subscribed to `topic`. A client whose
    /// mailbox is full or closed is dropped from the registry; no other
    /// client's delivery is affected (spec §8 property 8).
    pub fn broadcast(&self, topic: Topic, payload: &str) {
        let snapshot: Vec<(String, mpsc::Sender<String>)> = {
            let clients = self.lock_clients();
            clients
                .iter()
                .filter(|(_, handle)| handle.topics.contains(&topic))
                .map(|(id, handle)| (id.clone(), handle.sender.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (client_id, sender) in snapshot {
            if sender.try_send(payload.to_string()).is_err() {
                warn!(client_id = %client_id, %topic, "websocket client mailbox full or closed, evicting");
                dead.push(client_id);
            }
        }

        if !dead.is_empty() {
            let mut clients = self.lock_clients();
            for client_id in dead {
                clients.remove(&client_id);
            }
        }
    }

    /// Closes every connected client with `reason` and empties the registry
    /// (spec §5 shutdown sequence: "closes the hub (which closes each
    /// client with a reason)"). Queues a closing notice on each client's
    /// mailbox before dropping its sender, so the transport task's next
    /// `outbox.recv()` sees the closed channel and ends that connection's
    /// read/write loop.
    pub fn close_all(&self, reason: &str) {
        let payload = serde_json::to_string(&crate::messages::ErrorMessage::new(reason))
            .unwrap_or_else(|_| "{\"type\":\"error\"}".to_string());
        let mut clients = self.lock_clients();
        for handle in clients.values() {
            let _ = handle.sender.try_send(payload.clone());
        }
        let count = clients.len();
        clients.clear();
        debug!(count, %reason, "closed all websocket clients for shutdown");
    }

    /// One keep-alive sweep (spec §4.7): pings every client by queuing a
    /// ping payload, then (on the *next* sweep) evicts any client that has
    /// not produced a pong/activity since before the previous sweep began.
    /// Run on a `ping_interval` cadence by the hub's background task.
    pub fn sweep_stale_clients(&self, max_silence: Duration) {
        let now = Instant::now();
        let stale: Vec<String> = {
            let clients = self.lock_clients();
            clients
                .iter()
                .filter_map(|(id, handle)| {
                    let last = *handle.last_pong.lock().unwrap_or_else(|e| e.into_inner());
                    if now.saturating_duration_since(last) > max_silence {
                        Some(id.clone())
                    } else {
                        None
                    }
                })
                .collect()
        };
        for client_id in &stale {
            self.close(client_id);
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "evicted stale websocket clients");
        }
    }

    fn lock_clients(&self) -> std::sync::MutexGuard<'_, HashMap<String, ClientHandle>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configured ping cadence.
    pub fn ping_interval(&self) -> Duration {
        self.config.ping_interval
    }
}

/// Sends a single frame with the bounded timeout spec §5 requires of every
/// WebSocket send. Used by the transport layer when draining a client's
/// outbox into the socket.
pub async fn send_with_timeout<F, E>(send: F) -> Result<(), ()>
where
    F: std::future::Future<Output = Result<(), E>>,
{
    match timeout(SEND_TIMEOUT, send).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) | Err(_) => Err(()),
    }
}

/// Stamps `last_pong` with the current instant; called by the transport
/// layer on every inbound client frame (ping, pong, or text heartbeat).
pub fn note_activity(last_pong: &Arc<Mutex<Instant>>) {
    let mut guard = last_pong.lock().unwrap_or_else(|e| e.into_inner());
    *guard = Instant::now();
}

/// `DateTime<Utc>::now()` wrapper kept for message timestamping symmetry
/// with the other stream modules (kept here so callers don't need to pull
/// in `chrono` just to stamp a frame built outside `messages.rs`).
pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

/// Spawns the background keep-alive sweep: every `ping_interval`, clients
/// silent for more than two intervals (spec §4.7: "does not pong within
/// the next interval") are evicted. Runs until `token` is cancelled.
pub fn spawn_keepalive_sweep(
    hub: Arc<Hub>,
    token: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let interval = hub.ping_interval();
    tokio::spawn(async move {
        let max_silence = interval.saturating_mul(2);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    hub.sweep_stale_clients(max_silence);
                }
                _ = token.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_enforces_max_connections() {
        let mut config = HubConfig::default();
        config.max_connections = 1;
        let hub = Hub::new(config);

        let _first = hub.accept().unwrap();
        let second = hub.accept();
        assert_eq!(second.unwrap_err(), HubError::Capacity);
    }

    #[test]
    fn broadcast_survives_a_dead_client() {
        let hub = Hub::new(HubConfig::default());
        let a = hub.accept().unwrap();
        let b = hub.accept().unwrap();
        let c = hub.accept().unwrap();

        drop(b.outbox);

        hub.broadcast(Topic::Signals, "{\"type\":\"signal\"}");

        assert_eq!(hub.connection_count(), 2);
        drop(a);
        drop(c);
    }

    #[test]
    fn close_removes_client() {
        let hub = Hub::new(HubConfig::default());
        let client = hub.accept().unwrap();
        assert_eq!(hub.connection_count(), 1);
        hub.close(&client.client_id);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn close_all_empties_the_registry_and_notifies_every_client() {
        let hub = Hub::new(HubConfig::default());
        let mut a = hub.accept().unwrap();
        let mut b = hub.accept().unwrap();
        assert_eq!(hub.connection_count(), 2);

        hub.close_all("shutting down");

        assert_eq!(hub.connection_count(), 0);
        assert!(a.outbox.try_recv().expect("a got a closing notice").contains("shutting down"));
        assert!(b.outbox.try_recv().expect("b got a closing notice").contains("shutting down"));
    }

    #[test]
    fn sweep_evicts_clients_silent_past_the_threshold() {
        let hub = Hub::new(HubConfig::default());
        let client = hub.accept().unwrap();
        {
            let mut guard = client.last_pong.lock().unwrap();
            *guard = Instant::now() - Duration::from_secs(120);
        }
        hub.sweep_stale_clients(Duration::from_secs(60));
        assert_eq!(hub.connection_count(), 0);
    }
}
