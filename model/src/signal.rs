use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::{self, Display, Formatter};

/// Kind of action a strategy recommends (spec §3, §GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Open or add to a long position.
    Buy,
    /// Open a short or reduce a long position outside of an exit check.
    Sell,
    /// No action this tick.
    Hold,
    /// Close an open position, produced by `should_exit`/profit-taking rather than `on_bars`.
    Exit,
}

impl Display for SignalKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Buy => write!(f, "buy"),
            SignalKind::Sell => write!(f, "sell"),
            SignalKind::Hold => write!(f, "hold"),
            SignalKind::Exit => write!(f, "exit"),
        }
    }
}

/// A strategy-produced recommendation to act (spec §3).
///
/// Ephemeral: signals are never persisted as their own entity, only as
/// influence on the trades they lead to (a `Trade.strategy_id` back-reference).
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// What the strategy recommends.
    pub kind: SignalKind,
    /// Ticker symbol.
    pub symbol: String,
    /// Reference price the signal was generated against.
    pub price: Decimal,
    /// Suggested quantity, before the risk engine's sizing overrides it.
    pub quantity: Option<i64>,
    /// Strategy-local confidence in `[0, 1]`.
    pub confidence: Decimal,
    /// Human-readable justification, surfaced in logs and the WebSocket `signal` message.
    pub reason: String,
    /// When the signal was generated.
    pub generated_at: DateTime<Utc>,
    /// Originating strategy instance.
    pub strategy_id: String,
    /// Key level the signal references (e.g. previous-day high), if applicable.
    pub entry_level: Option<Decimal>,
    /// Suggested stop-loss price, if applicable.
    pub stop_loss: Option<Decimal>,
    /// Suggested take-profit price, if applicable.
    pub take_profit: Option<Decimal>,
}

impl Signal {
    /// A `hold` signal carrying no recommendation, used as the default "nothing to do" result.
    pub fn hold(symbol: impl Into<String>, strategy_id: impl Into<String>, price: Decimal) -> Self {
        Signal {
            kind: SignalKind::Hold,
            symbol: symbol.into(),
            price,
            quantity: None,
            confidence: Decimal::ZERO,
            reason: "no setup".to_string(),
            generated_at: Utc::now(),
            strategy_id: strategy_id.into(),
            entry_level: None,
            stop_loss: None,
            take_profit: None,
        }
    }

    /// True for any signal that is not `hold` — i.e. one that should reach callbacks and the risk gate.
    pub fn is_actionable(&self) -> bool {
        !matches!(self.kind, SignalKind::Hold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn hold_signal_is_not_actionable() {
        let signal = Signal::hold("AAPL", "s1", dec!(150));
        assert!(!signal.is_actionable());
    }

    #[test]
    fn buy_signal_is_actionable() {
        let mut signal = Signal::hold("AAPL", "s1", dec!(150));
        signal.kind = SignalKind::Buy;
        assert!(signal.is_actionable());
    }
}
