//! Background publisher tasks (spec §4.7 "Streams").
//!
//! `SignalStream` and `TradePublisher` are event-driven and fold into
//! [`crate::sink::HubEventSink`] rather than living here as their own
//! polling loops, since the scheduler already funnels every signal and
//! fill through its `EventSink` (see `sink.rs`'s module doc). The two
//! genuinely interval-driven streams — price polling and the
//! change-detected portfolio poll — live in these submodules.

/// Polls broker market data on an interval and broadcasts batched price changes.
pub mod price_stream;
/// Polls open positions on an interval and broadcasts on change.
pub mod portfolio_stream;
