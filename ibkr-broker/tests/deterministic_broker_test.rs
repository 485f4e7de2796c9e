use chrono::Utc;
use ibkr_broker::IbkrBroker;
use model::{AccountSummary, Bar, BarTimeframe, Broker, MarketSnapshot, OrderSide, OrderType};
use rust_decimal_macros::dec;
use std::time::Duration;

fn bar(close: rust_decimal::Decimal) -> Bar {
    Bar {
        t: Utc::now(),
        o: close,
        h: close,
        l: close,
        c: close,
        v: 1_000,
    }
}

#[test]
fn identical_bars_yield_identical_fills_through_a_deterministic_broker() {
    let broker = IbkrBroker::new_mock();
    broker.connect("localhost", 7497, 7, Duration::from_secs(1)).unwrap();
    broker.mock_backend().set_market_data(
        "AAPL",
        MarketSnapshot {
            last: dec!(150),
            bid: dec!(149.95),
            ask: dec!(150.05),
            high: dec!(151),
            low: dec!(149),
            volume: 10_000,
            as_of: Utc::now(),
        },
    );
    broker.mock_backend().set_bars(
        "AAPL",
        BarTimeframe::OneMinute,
        vec![bar(dec!(150)); 5],
    );

    let first = broker.place_order("AAPL", OrderSide::Buy, 5, OrderType::Market).unwrap();
    let second_fills: Vec<_> = broker.poll_events(10);
    assert_eq!(second_fills.len(), 1);

    let bars_a = broker.bars("AAPL", BarTimeframe::OneMinute, 3).unwrap();
    let bars_b = broker.bars("AAPL", BarTimeframe::OneMinute, 3).unwrap();
    assert_eq!(bars_a, bars_b);
    assert_eq!(bars_a.len(), 3);
    assert!(first.0.starts_with("mock-"));
}

#[test]
fn bars_returns_fewer_than_requested_without_failing() {
    let broker = IbkrBroker::new_mock();
    broker.connect("localhost", 7497, 7, Duration::from_secs(1)).unwrap();
    broker.mock_backend().set_bars("MSFT", BarTimeframe::OneDay, vec![bar(dec!(300))]);

    let bars = broker.bars("MSFT", BarTimeframe::OneDay, 10).unwrap();
    assert_eq!(bars.len(), 1);
}

#[test]
fn disconnected_broker_rejects_account_summary() {
    let broker = IbkrBroker::new_mock();
    broker.mock_backend().set_account_summary(AccountSummary {
        net_liquidation: dec!(50000),
        total_cash: dec!(20000),
    });
    let err = broker.account_summary().unwrap_err();
    assert_eq!(err.kind, model::ErrorKind::Disconnected);
}
