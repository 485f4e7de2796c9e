use crate::indicators::rolling_high_low;
use crate::strategy::StrategyLogic;
use model::{Bar, Position, Signal, SignalKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Identifies the prior session's high/low and enters when price trades
/// within a configurable proximity of either level (spec §4.3 #1).
#[derive(Debug, Clone)]
pub struct LevelBoundedRange {
    /// Fractional distance from a level still counted as "at" it (e.g. `0.002` = 0.2%).
    pub proximity_pct: Decimal,
    /// Stop-loss distance below/above the entry level, as a fraction.
    pub stop_loss_pct: Decimal,
    /// Minimum volume (vs. the lookback average) required to confirm an entry. `None` disables the check.
    pub volume_confirmation_multiplier: Option<Decimal>,
}

impl Default for LevelBoundedRange {
    fn default() -> Self {
        LevelBoundedRange {
            proximity_pct: dec!(0.002),
            stop_loss_pct: dec!(0.01),
            volume_confirmation_multiplier: None,
        }
    }
}

impl StrategyLogic for LevelBoundedRange {
    fn on_bars(&self, bars: &[Bar], open_position: Option<&Position>) -> Signal {
        let strategy_id = "level_bounded_range";
        let Some(last) = bars.last() else {
            return Signal::hold("", strategy_id, Decimal::ZERO);
        };
        let symbol_hold = || Signal::hold("", strategy_id, last.c);

        if open_position.is_some() {
            return symbol_hold();
        }

        // Levels are drawn from every bar except the most recent, which is
        // the candidate entry bar.
        let Some(history) = bars.get(..bars.len().saturating_sub(1)) else {
            return symbol_hold();
        };
        let Some((high, low)) = rolling_high_low(history) else {
            return symbol_hold();
        };
        if low.is_zero() {
            return symbol_hold();
        }

        let distance_to_low = match last.c.checked_sub(low).and_then(|d| d.checked_div(low)) {
            Some(d) => d,
            None => return symbol_hold(),
        };

        if distance_to_low.abs() > self.proximity_pct || last.c < low {
            return symbol_hold();
        }

        if let Some(multiplier) = self.volume_confirmation_multiplier {
            let avg_volume = history.iter().map(|b| b.v).sum::<u64>() / (history.len() as u64).max(1);
            let threshold = Decimal::from(avg_volume).checked_mul(multiplier).unwrap_or(Decimal::ZERO);
            if Decimal::from(last.v) < threshold {
                return symbol_hold();
            }
        }

        let stop_loss = low
            .checked_mul(Decimal::ONE.checked_sub(self.stop_loss_pct).unwrap_or(Decimal::ONE))
            .unwrap_or(low);

        Signal {
            kind: SignalKind::Buy,
            symbol: String::new(),
            price: last.c,
            quantity: None,
            confidence: dec!(0.6),
            reason: "price at previous-session low".to_string(),
            generated_at: last.t,
            strategy_id: strategy_id.to_string(),
            entry_level: Some(low),
            stop_loss: Some(stop_loss),
            take_profit: Some(high),
        }
    }

    fn should_exit(&self, open_position: &Position, bars: &[Bar]) -> (bool, String) {
        let Some(last) = bars.last() else {
            return (false, String::new());
        };
        let stop_price = open_position
            .average_price
            .checked_mul(Decimal::ONE.checked_sub(self.stop_loss_pct).unwrap_or(Decimal::ONE))
            .unwrap_or(Decimal::ZERO);
        if last.c <= stop_price {
            return (true, "price breached level stop-loss".to_string());
        }
        (false, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(close: Decimal, high: Decimal, low: Decimal) -> Bar {
        Bar {
            t: Utc::now(),
            o: close,
            h: high,
            l: low,
            c: close,
            v: 1_000,
        }
    }

    #[test]
    fn buys_near_prior_low() {
        let strategy = LevelBoundedRange::default();
        let mut bars: Vec<Bar> = (0..10)
            .map(|_| bar(dec!(100), dec!(105), dec!(95)))
            .collect();
        bars.push(bar(dec!(95.1), dec!(95.2), dec!(95)));

        let signal = strategy.on_bars(&bars, None);
        assert_eq!(signal.kind, SignalKind::Buy);
        assert_eq!(signal.entry_level, Some(dec!(95)));
    }

    #[test]
    fn holds_far_from_any_level() {
        let strategy = LevelBoundedRange::default();
        let mut bars: Vec<Bar> = (0..10)
            .map(|_| bar(dec!(100), dec!(105), dec!(95)))
            .collect();
        bars.push(bar(dec!(100), dec!(100), dec!(100)));

        let signal = strategy.on_bars(&bars, None);
        assert_eq!(signal.kind, SignalKind::Hold);
    }

    #[test]
    fn exits_when_price_breaches_stop() {
        let strategy = LevelBoundedRange::default();
        let position = Position {
            id: model::PositionId(1),
            account_id: model::AccountId(1),
            symbol: "AAPL".to_string(),
            quantity: 10,
            average_price: dec!(100),
            current_price: dec!(100),
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
            status: model::PositionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            last_synced_at: Utc::now(),
            realized_pnl: None,
        };
        let bars = vec![bar(dec!(98), dec!(99), dec!(97))];
        let (should_exit, _) = strategy.should_exit(&position, &bars);
        assert!(should_exit);
    }
}
