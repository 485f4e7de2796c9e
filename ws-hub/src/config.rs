use std::time::Duration;

/// Typed `websocket.*` configuration (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Whether the hub and its streams run at all (spec §6 `websocket.enabled`).
    pub enabled: bool,
    /// Interval between keep-alive pings to each client.
    pub ping_interval: Duration,
    /// Maximum concurrent connections before `accept` returns `error(capacity)`.
    pub max_connections: usize,
    /// Cadence of the price-polling stream.
    pub price_update_interval: Duration,
    /// Cadence of the portfolio-polling stream.
    pub portfolio_update_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            enabled: true,
            ping_interval: Duration::from_secs(30),
            max_connections: 100,
            price_update_interval: Duration::from_secs(3),
            portfolio_update_interval: Duration::from_secs(5),
        }
    }
}
