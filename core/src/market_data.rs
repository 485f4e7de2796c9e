//! Market data facade (C2): a thin, cacheable adapter over the broker's bar feed.

use chrono::Utc;
use model::{Bar, BarTimeframe, Broker, ErrorKind, RuntimeError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// `bars(symbol, timeframe, n) -> [Bar]` (spec §4.2). Implementations may
/// layer caches or alternate providers; the contract is that a short
/// history is returned rather than padded, and unavailability never
/// returns partial results.
pub trait MarketDataFacade: Send + Sync {
    /// Returns up to `n` contiguous, ascending bars for `symbol`/`timeframe`
    /// ending at or before now. Fewer than `n` may come back if that much
    /// history does not exist; never a partial failure.
    fn bars(&self, symbol: &str, timeframe: BarTimeframe, n: usize) -> Result<Vec<Bar>, RuntimeError>;
}

/// Default facade: delegates directly to a connected [`Broker`].
pub struct BrokerMarketDataFacade<'a> {
    broker: &'a dyn Broker,
}

impl<'a> BrokerMarketDataFacade<'a> {
    /// Wraps `broker` as a market data source.
    pub fn new(broker: &'a dyn Broker) -> Self {
        BrokerMarketDataFacade { broker }
    }
}

impl MarketDataFacade for BrokerMarketDataFacade<'_> {
    fn bars(&self, symbol: &str, timeframe: BarTimeframe, n: usize) -> Result<Vec<Bar>, RuntimeError> {
        if !self.broker.is_connected() {
            return Err(RuntimeError::new(
                ErrorKind::Disconnected,
                "broker not connected",
            ));
        }
        self.broker.bars(symbol, timeframe, n)
    }
}

/// Decorator adding a short-TTL in-memory cache in front of any
/// [`MarketDataFacade`]. Caching strategy/provider choice is explicitly
/// pluggable per spec.md, so this stays deliberately minimal: one entry
/// per `(symbol, timeframe)`, refreshed wholesale on expiry.
pub struct CachingMarketDataFacade<F> {
    inner: F,
    ttl: Duration,
    cache: Mutex<HashMap<(String, BarTimeframe), CacheEntry>>,
}

struct CacheEntry {
    bars: Vec<Bar>,
    fetched_at: Instant,
}

impl<F: MarketDataFacade> CachingMarketDataFacade<F> {
    /// Wraps `inner`, caching responses for `ttl`.
    pub fn new(inner: F, ttl: Duration) -> Self {
        CachingMarketDataFacade {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl<F: MarketDataFacade> MarketDataFacade for CachingMarketDataFacade<F> {
    fn bars(&self, symbol: &str, timeframe: BarTimeframe, n: usize) -> Result<Vec<Bar>, RuntimeError> {
        let key = (symbol.to_string(), timeframe);

        {
            let cache = self
                .cache
                .lock()
                .map_err(|_| RuntimeError::new(ErrorKind::Internal, "market data cache poisoned"))?;
            if let Some(entry) = cache.get(&key) {
                if entry.fetched_at.elapsed() < self.ttl && entry.bars.len() >= n {
                    return Ok(entry.bars.iter().rev().take(n).rev().copied().collect());
                }
            }
        }

        let bars = self.inner.bars(symbol, timeframe, n)?;

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| RuntimeError::new(ErrorKind::Internal, "market data cache poisoned"))?;
        cache.insert(
            key,
            CacheEntry {
                bars: bars.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(bars)
    }
}

/// True when the current UTC instant falls within the 09:30-16:00 ET
/// weekday session (spec §4.6). ET is modeled as a fixed UTC-5 offset;
/// daylight saving is a known simplification (no holiday calendar either,
/// per spec.md's Non-goals).
pub fn is_market_hours_now() -> bool {
    is_market_hours_at(Utc::now())
}

fn is_market_hours_at(now: chrono::DateTime<Utc>) -> bool {
    use chrono::{Datelike, Timelike, Weekday};

    let et_offset_hours: i64 = 5;
    let et = now - chrono::Duration::hours(et_offset_hours);

    if matches!(et.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let minutes_since_midnight = i64::from(et.hour()).saturating_mul(60) + i64::from(et.minute());
    let open = 9 * 60 + 30;
    let close = 16 * 60;
    minutes_since_midnight >= open && minutes_since_midnight < close
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFacade {
        calls: AtomicUsize,
    }

    impl MarketDataFacade for CountingFacade {
        fn bars(&self, _symbol: &str, _timeframe: BarTimeframe, n: usize) -> Result<Vec<Bar>, RuntimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..n)
                .map(|_| Bar {
                    t: Utc::now(),
                    o: dec!(1),
                    h: dec!(1),
                    l: dec!(1),
                    c: dec!(1),
                    v: 1,
                })
                .collect())
        }
    }

    #[test]
    fn caching_facade_serves_from_cache_within_ttl() {
        let inner = CountingFacade {
            calls: AtomicUsize::new(0),
        };
        let facade = CachingMarketDataFacade::new(inner, Duration::from_secs(60));

        facade.bars("AAPL", BarTimeframe::OneMinute, 5).unwrap();
        facade.bars("AAPL", BarTimeframe::OneMinute, 5).unwrap();

        assert_eq!(facade.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn caching_facade_refetches_for_a_different_symbol() {
        let inner = CountingFacade {
            calls: AtomicUsize::new(0),
        };
        let facade = CachingMarketDataFacade::new(inner, Duration::from_secs(60));

        facade.bars("AAPL", BarTimeframe::OneMinute, 5).unwrap();
        facade.bars("MSFT", BarTimeframe::OneMinute, 5).unwrap();

        assert_eq!(facade.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn weekday_during_session_is_market_hours() {
        let at = Utc.with_ymd_and_hms(2026, 7, 28, 15, 0, 0).unwrap();
        assert!(is_market_hours_at(at));
    }

    #[test]
    fn weekend_is_not_market_hours() {
        let at = Utc.with_ymd_and_hms(2026, 8, 1, 15, 0, 0).unwrap();
        assert!(!is_market_hours_at(at));
    }

    #[test]
    fn before_open_is_not_market_hours() {
        let at = Utc.with_ymd_and_hms(2026, 7, 28, 13, 0, 0).unwrap();
        assert!(!is_market_hours_at(at));
    }
}
