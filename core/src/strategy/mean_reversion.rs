use crate::indicators::bollinger;
use crate::strategy::StrategyLogic;
use model::{Bar, Position, Signal, SignalKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Bollinger-band / Z-score mean-reversion entries (spec §4.3 #2).
///
/// Buys when the close trades at or below the lower band (a Z-score
/// at or beyond `-entry_z`), on the premise that price reverts toward
/// the middle band; exits on reversion to the middle band or a further
/// band-width stop-loss below the lower band.
#[derive(Debug, Clone)]
pub struct MeanReversion {
    /// Bollinger lookback period.
    pub period: usize,
    /// Standard-deviation multiplier for the bands.
    pub stddev_multiplier: Decimal,
    /// Z-score threshold that triggers an entry (negative, e.g. `-2.0`).
    pub entry_z: Decimal,
}

impl Default for MeanReversion {
    fn default() -> Self {
        MeanReversion {
            period: 20,
            stddev_multiplier: dec!(2),
            entry_z: dec!(-2),
        }
    }
}

impl StrategyLogic for MeanReversion {
    fn on_bars(&self, bars: &[Bar], open_position: Option<&Position>) -> Signal {
        let strategy_id = "mean_reversion";
        let Some(last) = bars.last() else {
            return Signal::hold("", strategy_id, Decimal::ZERO);
        };
        let hold = || Signal::hold("", strategy_id, last.c);

        if open_position.is_some() {
            return hold();
        }

        let Some(bands) = bollinger(bars, self.period, self.stddev_multiplier) else {
            return hold();
        };

        if bands.z_score > self.entry_z {
            return hold();
        }

        // Confidence scales with how far below the entry threshold the
        // Z-score has gone, clamped to [0.4, 0.95].
        let confidence = self
            .entry_z
            .checked_sub(bands.z_score)
            .map(|excess| dec!(0.5).checked_add(excess.checked_div(dec!(4)).unwrap_or(Decimal::ZERO)).unwrap_or(dec!(0.5)))
            .unwrap_or(dec!(0.5))
            .clamp(dec!(0.4), dec!(0.95));

        let band_width = bands.upper.checked_sub(bands.lower).unwrap_or(Decimal::ZERO);
        let stop_loss = bands
            .lower
            .checked_sub(band_width)
            .unwrap_or(bands.lower);

        Signal {
            kind: SignalKind::Buy,
            symbol: String::new(),
            price: last.c,
            quantity: None,
            confidence,
            reason: format!("price at {:.2} Z-score below band", bands.z_score),
            generated_at: last.t,
            strategy_id: strategy_id.to_string(),
            entry_level: Some(bands.lower),
            stop_loss: Some(stop_loss),
            take_profit: Some(bands.middle),
        }
    }

    fn should_exit(&self, open_position: &Position, bars: &[Bar]) -> (bool, String) {
        let Some(bands) = bollinger(bars, self.period, self.stddev_multiplier) else {
            return (false, String::new());
        };
        let Some(last) = bars.last() else {
            return (false, String::new());
        };

        if last.c >= bands.middle {
            return (true, "price reverted to the middle band".to_string());
        }

        let band_width = bands.upper.checked_sub(bands.lower).unwrap_or(Decimal::ZERO);
        let stop_loss = bands.lower.checked_sub(band_width).unwrap_or(bands.lower);
        if last.c <= stop_loss {
            return (true, "price broke below the reversion stop-loss".to_string());
        }

        let _ = open_position;
        (false, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(close: Decimal) -> Bar {
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
    fn buys_when_price_drops_far_below_the_lower_band() {
        let strategy = MeanReversion::default();
        let mut bars: Vec<Bar> = (0..19).map(|_| bar(dec!(100))).collect();
        bars.push(bar(dec!(70)));

        let signal = strategy.on_bars(&bars, None);
        assert_eq!(signal.kind, SignalKind::Buy);
    }

    #[test]
    fn holds_on_a_flat_series() {
        let strategy = MeanReversion::default();
        let bars: Vec<Bar> = (0..20).map(|_| bar(dec!(100))).collect();
        let signal = strategy.on_bars(&bars, None);
        assert_eq!(signal.kind, SignalKind::Hold);
    }

    #[test]
    fn exits_on_reversion_to_the_middle_band() {
        let strategy = MeanReversion::default();
        let mut bars: Vec<Bar> = (0..19).map(|_| bar(dec!(100))).collect();
        bars.push(bar(dec!(100)));
        let position = Position {
            id: model::PositionId(1),
            account_id: model::AccountId(1),
            symbol: "AAPL".to_string(),
            quantity: 10,
            average_price: dec!(95),
            current_price: dec!(100),
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
            status: model::PositionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            last_synced_at: Utc::now(),
            realized_pnl: None,
        };
        let (should_exit, _) = strategy.should_exit(&position, &bars);
        assert!(should_exit);
    }
}
