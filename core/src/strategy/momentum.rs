use crate::indicators::{ema, macd, rsi};
use crate::strategy::StrategyLogic;
use model::{Bar, Position, Signal, SignalKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// RSI + MACD + volume momentum entries (spec §4.3 #2).
///
/// Buys when RSI confirms rising momentum without being overbought, MACD's
/// histogram is positive (bullish crossover), and volume exceeds its
/// lookback average by `volume_multiplier`.
#[derive(Debug, Clone)]
pub struct Momentum {
    /// RSI lookback period.
    pub rsi_period: usize,
    /// RSI floor below which momentum is considered too weak to act on.
    pub rsi_floor: Decimal,
    /// RSI ceiling above which the move is considered overbought.
    pub rsi_ceiling: Decimal,
    /// Volume lookback window for the confirmation average.
    pub volume_lookback: usize,
    /// Multiple of average volume required to confirm entry.
    pub volume_multiplier: Decimal,
    /// Stop-loss distance from entry, as a fraction.
    pub stop_loss_pct: Decimal,
}

impl Default for Momentum {
    fn default() -> Self {
        Momentum {
            rsi_period: 14,
            rsi_floor: dec!(50),
            rsi_ceiling: dec!(70),
            volume_lookback: 20,
            volume_multiplier: dec!(1.5),
            stop_loss_pct: dec!(0.02),
        }
    }
}

impl StrategyLogic for Momentum {
    fn on_bars(&self, bars: &[Bar], open_position: Option<&Position>) -> Signal {
        let strategy_id = "momentum";
        let Some(last) = bars.last() else {
            return Signal::hold("", strategy_id, Decimal::ZERO);
        };
        let hold = || Signal::hold("", strategy_id, last.c);

        if open_position.is_some() {
            return hold();
        }

        let Some(rsi_value) = rsi(bars, self.rsi_period) else {
            return hold();
        };
        if rsi_value <= self.rsi_floor || rsi_value >= self.rsi_ceiling {
            return hold();
        }

        let Some(macd_value) = macd(bars, 12, 26, 9) else {
            return hold();
        };
        if macd_value.histogram <= Decimal::ZERO {
            return hold();
        }

        let Some(volume_window) = bars.get(bars.len().saturating_sub(self.volume_lookback)..) else {
            return hold();
        };
        if volume_window.is_empty() {
            return hold();
        }
        let avg_volume = volume_window.iter().map(|b| b.v).sum::<u64>() / (volume_window.len() as u64);
        let volume_threshold = match Decimal::from(avg_volume).checked_mul(self.volume_multiplier) {
            Some(v) => v,
            None => return hold(),
        };
        if Decimal::from(last.v) < volume_threshold {
            return hold();
        }

        // Confidence scales with how far RSI sits above the midpoint between
        // floor and ceiling, clamped to [0, 1].
        let midpoint = self
            .rsi_floor
            .checked_add(self.rsi_ceiling)
            .and_then(|s| s.checked_div(dec!(2)))
            .unwrap_or(self.rsi_floor);
        let span = self.rsi_ceiling.checked_sub(midpoint).filter(|s| !s.is_zero());
        let confidence = span
            .and_then(|span| rsi_value.checked_sub(midpoint).and_then(|d| d.checked_div(span)))
            .map(|ratio| ratio.clamp(dec!(0.3), dec!(0.95)))
            .unwrap_or(dec!(0.5));

        let stop_loss = last
            .c
            .checked_mul(Decimal::ONE.checked_sub(self.stop_loss_pct).unwrap_or(Decimal::ONE))
            .unwrap_or(last.c);

        Signal {
            kind: SignalKind::Buy,
            symbol: String::new(),
            price: last.c,
            quantity: None,
            confidence,
            reason: "RSI/MACD/volume momentum confirmed".to_string(),
            generated_at: last.t,
            strategy_id: strategy_id.to_string(),
            entry_level: None,
            stop_loss: Some(stop_loss),
            take_profit: None,
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
            return (true, "price breached momentum stop-loss".to_string());
        }

        if let Some(macd_value) = macd(bars, 12, 26, 9) {
            if macd_value.histogram < Decimal::ZERO {
                return (true, "MACD histogram turned negative".to_string());
            }
        }

        if let Some(rsi_value) = rsi(bars, self.rsi_period) {
            if rsi_value >= dec!(80) {
                return (true, "RSI overbought".to_string());
            }
        }

        let _ = ema(bars, self.rsi_period);
        (false, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rising_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                t: Utc::now(),
                o: dec!(100),
                h: dec!(100) + Decimal::from(i),
                l: dec!(99),
                c: dec!(100) + Decimal::from(i),
                v: 1_000 + (i as u64) * 50,
            })
            .collect()
    }

    #[test]
    fn holds_without_enough_history() {
        let strategy = Momentum::default();
        let bars = rising_bars(5);
        let signal = strategy.on_bars(&bars, None);
        assert_eq!(signal.kind, SignalKind::Hold);
    }

    #[test]
    fn holds_when_already_holding_a_position() {
        let strategy = Momentum::default();
        let bars = rising_bars(40);
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
        let signal = strategy.on_bars(&bars, Some(&position));
        assert_eq!(signal.kind, SignalKind::Hold);
    }

    #[test]
    fn exits_on_stop_loss_breach() {
        let strategy = Momentum::default();
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
        let bars = vec![Bar {
            t: Utc::now(),
            o: dec!(95),
            h: dec!(96),
            l: dec!(94),
            c: dec!(95),
            v: 500,
        }];
        let (should_exit, _) = strategy.should_exit(&position, &bars);
        assert!(should_exit);
    }
}
