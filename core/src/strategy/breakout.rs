use crate::indicators::{atr, rolling_high_low};
use crate::strategy::StrategyLogic;
use model::{Bar, Position, Signal, SignalKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Range + volume + ATR breakout entries (spec §4.3 #2).
///
/// Buys when the close trades above the prior range's high on volume
/// confirmation; stop-loss is `atr_stop_multiplier * ATR` below entry.
#[derive(Debug, Clone)]
pub struct Breakout {
    /// Number of preceding bars (excluding the candidate bar) that define the range.
    pub range_lookback: usize,
    /// ATR period used to size the stop-loss.
    pub atr_period: usize,
    /// Multiple of ATR subtracted from entry price for the stop-loss.
    pub atr_stop_multiplier: Decimal,
    /// Multiple of average range volume required to confirm the breakout.
    pub volume_multiplier: Decimal,
}

impl Default for Breakout {
    fn default() -> Self {
        Breakout {
            range_lookback: 20,
            atr_period: 14,
            atr_stop_multiplier: dec!(1.5),
            volume_multiplier: dec!(1.5),
        }
    }
}

impl StrategyLogic for Breakout {
    fn on_bars(&self, bars: &[Bar], open_position: Option<&Position>) -> Signal {
        let strategy_id = "breakout";
        let Some(last) = bars.last() else {
            return Signal::hold("", strategy_id, Decimal::ZERO);
        };
        let hold = || Signal::hold("", strategy_id, last.c);

        if open_position.is_some() {
            return hold();
        }

        let history_len = bars.len().saturating_sub(1).min(self.range_lookback);
        let Some(history) = bars.get(bars.len().saturating_sub(1).saturating_sub(history_len)..bars.len().saturating_sub(1)) else {
            return hold();
        };
        if history.is_empty() {
            return hold();
        }
        let Some((range_high, _range_low)) = rolling_high_low(history) else {
            return hold();
        };

        if last.c <= range_high {
            return hold();
        }

        let avg_volume = history.iter().map(|b| b.v).sum::<u64>() / (history.len() as u64);
        let volume_threshold = match Decimal::from(avg_volume).checked_mul(self.volume_multiplier) {
            Some(v) => v,
            None => return hold(),
        };
        if Decimal::from(last.v) < volume_threshold {
            return hold();
        }

        let Some(atr_value) = atr(bars, self.atr_period) else {
            return hold();
        };
        let stop_distance = atr_value.checked_mul(self.atr_stop_multiplier).unwrap_or(Decimal::ZERO);
        let stop_loss = last.c.checked_sub(stop_distance).unwrap_or(last.c);

        // Confidence scales with how far the close cleared the range as a
        // fraction of ATR, clamped to [0.4, 0.95].
        let clearance = last.c.checked_sub(range_high).unwrap_or(Decimal::ZERO);
        let confidence = if atr_value.is_zero() {
            dec!(0.5)
        } else {
            clearance
                .checked_div(atr_value)
                .map(|ratio| (dec!(0.4) + ratio.checked_mul(dec!(0.2)).unwrap_or(Decimal::ZERO)).clamp(dec!(0.4), dec!(0.95)))
                .unwrap_or(dec!(0.5))
        };

        Signal {
            kind: SignalKind::Buy,
            symbol: String::new(),
            price: last.c,
            quantity: None,
            confidence,
            reason: "breakout above prior range on volume".to_string(),
            generated_at: last.t,
            strategy_id: strategy_id.to_string(),
            entry_level: Some(range_high),
            stop_loss: Some(stop_loss),
            take_profit: None,
        }
    }

    fn should_exit(&self, open_position: &Position, bars: &[Bar]) -> (bool, String) {
        let Some(last) = bars.last() else {
            return (false, String::new());
        };
        let Some(atr_value) = atr(bars, self.atr_period) else {
            return (false, String::new());
        };
        let stop_distance = atr_value.checked_mul(self.atr_stop_multiplier).unwrap_or(Decimal::ZERO);
        let stop_loss = open_position
            .average_price
            .checked_sub(stop_distance)
            .unwrap_or(Decimal::ZERO);
        if last.c <= stop_loss {
            return (true, "price breached the ATR breakout stop-loss".to_string());
        }
        (false, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar_ohlcv(close: Decimal, high: Decimal, low: Decimal, volume: u64) -> Bar {
        Bar {
            t: Utc::now(),
            o: close,
            h: high,
            l: low,
            c: close,
            v: volume,
        }
    }

    #[test]
    fn buys_on_a_confirmed_breakout() {
        let strategy = Breakout::default();
        let mut bars: Vec<Bar> = (0..20)
            .map(|_| bar_ohlcv(dec!(100), dec!(101), dec!(99), 1_000))
            .collect();
        bars.push(bar_ohlcv(dec!(110), dec!(111), dec!(100), 5_000));

        let signal = strategy.on_bars(&bars, None);
        assert_eq!(signal.kind, SignalKind::Buy);
    }

    #[test]
    fn holds_without_volume_confirmation() {
        let strategy = Breakout::default();
        let mut bars: Vec<Bar> = (0..20)
            .map(|_| bar_ohlcv(dec!(100), dec!(101), dec!(99), 1_000))
            .collect();
        bars.push(bar_ohlcv(dec!(110), dec!(111), dec!(100), 900));

        let signal = strategy.on_bars(&bars, None);
        assert_eq!(signal.kind, SignalKind::Hold);
    }
}
