use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

/// A named channel in the WebSocket hub (spec §GLOSSARY, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Batched price-change broadcasts.
    PriceUpdates,
    /// Strategy-generated signals.
    Signals,
    /// Executed trade fills.
    Trades,
    /// Portfolio/position snapshots.
    Portfolio,
}

impl Topic {
    /// All four topics, used for the MVP's auto-subscribe-to-everything behavior.
    pub fn all() -> [Topic; 4] {
        [
            Topic::PriceUpdates,
            Topic::Signals,
            Topic::Trades,
            Topic::Portfolio,
        ]
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Topic::PriceUpdates => write!(f, "price_updates"),
            Topic::Signals => write!(f, "signals"),
            Topic::Trades => write!(f, "trades"),
            Topic::Portfolio => write!(f, "portfolio"),
        }
    }
}

/// A connected client's topic subscriptions (spec §3). Ephemeral: lives only
/// for the lifetime of the WebSocket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Hub-assigned client identifier (a UUID per spec §4.7).
    pub client_id: String,
    /// Subscribed topics. MVP auto-subscribes every client to all four.
    pub topics: HashSet<Topic>,
}

impl Subscription {
    /// Creates a subscription for `client_id` subscribed to every topic, the MVP default.
    pub fn subscribe_all(client_id: impl Into<String>) -> Self {
        Subscription {
            client_id: client_id.into(),
            topics: Topic::all().into_iter().collect(),
        }
    }

    /// True if this client is subscribed to `topic`.
    pub fn is_subscribed_to(&self, topic: Topic) -> bool {
        self.topics.contains(&topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_all_covers_every_topic() {
        let sub = Subscription::subscribe_all("client-1");
        for topic in Topic::all() {
            assert!(sub.is_subscribed_to(topic));
        }
    }
}
