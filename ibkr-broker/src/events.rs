//! Bounded event queue for the broker session's callback stream (spec §4.1, §5).
//!
//! The session thread (or, for [`GatewayBackend`] implementations that
//! simulate one, whatever drives `drain_events`) must never block on a slow
//! consumer. Events are pushed into a fixed-capacity queue; once full, new
//! events are dropped with a warning rather than applying back-pressure to
//! the producer, and an overflow counter records how often that happened so
//! callers can decide to force a full resync (spec §7 `capacity`).

use model::BrokerEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Capacity of the broker event queue (spec §5).
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// A bounded, drop-when-full FIFO queue of [`BrokerEvent`]s.
#[derive(Debug, Default)]
pub struct BoundedEventQueue {
    inner: Mutex<VecDeque<BrokerEvent>>,
    overflowed: AtomicU64,
}

impl BoundedEventQueue {
    /// Builds an empty queue with the default capacity.
    pub fn new() -> Self {
        BoundedEventQueue {
            inner: Mutex::new(VecDeque::with_capacity(EVENT_QUEUE_CAPACITY)),
            overflowed: AtomicU64::new(0),
        }
    }

    /// Pushes `event`, dropping it (and counting the drop) if the queue is
    /// already at capacity.
    pub fn push(&self, event: BrokerEvent) {
        let Ok(mut queue) = self.inner.lock() else {
            return;
        };
        if queue.len() >= EVENT_QUEUE_CAPACITY {
            self.overflowed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("broker event queue full; dropping event");
            return;
        }
        queue.push_back(event);
    }

    /// Drains up to `max` events in FIFO order without blocking.
    pub fn drain(&self, max: usize) -> Vec<BrokerEvent> {
        let Ok(mut queue) = self.inner.lock() else {
            return Vec::new();
        };
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    /// Count of events dropped for capacity since construction.
    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::BrokerPosition;
    use rust_decimal_macros::dec;

    fn sample_event() -> BrokerEvent {
        BrokerEvent::PositionUpdate(BrokerPosition {
            symbol: "AAPL".to_string(),
            qty: 10,
            avg_price: dec!(150),
            market_price: dec!(151),
            unrealized_pnl: dec!(10),
        })
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue = BoundedEventQueue::new();
        queue.push(sample_event());
        queue.push(BrokerEvent::Error {
            code: "E1".to_string(),
            message: "test".to_string(),
        });
        let drained = queue.drain(10);
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], BrokerEvent::PositionUpdate(_)));
    }

    #[test]
    fn overflow_drops_and_counts_rather_than_blocking() {
        let queue = BoundedEventQueue::new();
        for _ in 0..EVENT_QUEUE_CAPACITY + 5 {
            queue.push(sample_event());
        }
        assert_eq!(queue.overflowed(), 5);
        assert_eq!(queue.drain(usize::MAX).len(), EVENT_QUEUE_CAPACITY);
    }
}
