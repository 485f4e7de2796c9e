//! Shared technical indicator math.
//!
//! Every function here is a pure calculation over a slice of `Bar`s or
//! `Decimal`s: no I/O, no state. Strategies in [`crate::strategy`] compose
//! these the same way the teacher's `calculators_*` modules compose pure
//! account/trade math (`calculators_risk`, `calculators_drawdown`, ...),
//! applied here to price series instead of ledgers.

use model::Bar;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Simple moving average of the last `period` closes. `None` if fewer than
/// `period` bars are available.
pub fn sma(bars: &[Bar], period: usize) -> Option<Decimal> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = bars.get(bars.len().checked_sub(period)?..)?;
    let sum = window
        .iter()
        .try_fold(Decimal::ZERO, |acc, bar| acc.checked_add(bar.c))?;
    sum.checked_div(Decimal::from(period as u64))
}

/// Exponential moving average of closes with smoothing factor `2 / (period + 1)`.
/// Seeded with the SMA of the first `period` bars. `None` if fewer than
/// `period` bars are available.
pub fn ema(bars: &[Bar], period: usize) -> Option<Decimal> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let seed_window = bars.get(..period)?;
    let seed_sum = seed_window
        .iter()
        .try_fold(Decimal::ZERO, |acc, bar| acc.checked_add(bar.c))?;
    let mut value = seed_sum.checked_div(Decimal::from(period as u64))?;

    let multiplier = dec!(2).checked_div(Decimal::from((period as u64).checked_add(1)?))?;
    for bar in bars.get(period..)? {
        let delta = bar.c.checked_sub(value)?;
        let weighted = delta.checked_mul(multiplier)?;
        value = value.checked_add(weighted)?;
    }
    Some(value)
}

/// Wilder's relative strength index over `period` bars. `None` if fewer
/// than `period + 1` bars are available (the first bar only seeds a delta).
pub fn rsi(bars: &[Bar], period: usize) -> Option<Decimal> {
    if period == 0 || bars.len() < period.checked_add(1)? {
        return None;
    }

    let mut gains = Decimal::ZERO;
    let mut losses = Decimal::ZERO;
    for window in bars.windows(2) {
        let (prev, curr) = (window.first()?, window.get(1)?);
        let delta = curr.c.checked_sub(prev.c)?;
        if delta.is_sign_positive() {
            gains = gains.checked_add(delta)?;
        } else {
            losses = losses.checked_add(delta.checked_neg()?)?;
        }
    }

    let period_dec = Decimal::from(period as u64);
    let avg_gain = gains.checked_div(period_dec)?;
    let avg_loss = losses.checked_div(period_dec)?;

    if avg_loss.is_zero() {
        return Some(dec!(100));
    }
    let rs = avg_gain.checked_div(avg_loss)?;
    let hundred_over_one_plus_rs = dec!(100).checked_div(dec!(1).checked_add(rs)?)?;
    dec!(100).checked_sub(hundred_over_one_plus_rs)
}

/// MACD line (fast EMA minus slow EMA) and its signal line (EMA of the MACD
/// line), the classic `(12, 26, 9)` parameterization exposed generically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    /// Fast EMA minus slow EMA.
    pub macd_line: Decimal,
    /// EMA of the MACD line over `signal_period`.
    pub signal_line: Decimal,
    /// `macd_line - signal_line`; positive favors bullish momentum.
    pub histogram: Decimal,
}

/// Computes MACD from closes. `None` if there is not enough history for
/// `slow_period` plus `signal_period` bars.
pub fn macd(bars: &[Bar], fast_period: usize, slow_period: usize, signal_period: usize) -> Option<Macd> {
    if bars.len() < slow_period.checked_add(signal_period)? {
        return None;
    }

    let mut macd_series = Vec::with_capacity(bars.len());
    for end in slow_period..=bars.len() {
        let window = bars.get(..end)?;
        let fast = ema(window, fast_period)?;
        let slow = ema(window, slow_period)?;
        macd_series.push(Bar {
            t: window.last()?.t,
            o: fast,
            h: fast,
            l: fast,
            c: fast.checked_sub(slow)?,
            v: 0,
        });
    }

    let signal_line = ema(&macd_series, signal_period)?;
    let macd_line = macd_series.last()?.c;
    Some(Macd {
        macd_line,
        signal_line,
        histogram: macd_line.checked_sub(signal_line)?,
    })
}

/// Bollinger bands computed from an `period`-bar SMA and standard deviation,
/// plus the current close expressed as a Z-score against that band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bollinger {
    /// Middle band (SMA).
    pub middle: Decimal,
    /// Upper band (`middle + stddev_multiplier * stddev`).
    pub upper: Decimal,
    /// Lower band (`middle - stddev_multiplier * stddev`).
    pub lower: Decimal,
    /// `(last_close - middle) / stddev`; 0 if stddev is 0.
    pub z_score: Decimal,
}

/// Computes Bollinger bands over the last `period` closes. `None` if fewer
/// than `period` bars are available.
pub fn bollinger(bars: &[Bar], period: usize, stddev_multiplier: Decimal) -> Option<Bollinger> {
    let middle = sma(bars, period)?;
    let window = bars.get(bars.len().checked_sub(period)?..)?;

    let variance_sum = window.iter().try_fold(Decimal::ZERO, |acc, bar| {
        let diff = bar.c.checked_sub(middle)?;
        let squared = diff.checked_mul(diff)?;
        acc.checked_add(squared)
    })?;
    let variance = variance_sum.checked_div(Decimal::from(period as u64))?;
    let stddev = decimal_sqrt(variance)?;

    let band_width = stddev.checked_mul(stddev_multiplier)?;
    let upper = middle.checked_add(band_width)?;
    let lower = middle.checked_sub(band_width)?;

    let last_close = bars.last()?.c;
    let z_score = if stddev.is_zero() {
        Decimal::ZERO
    } else {
        last_close.checked_sub(middle)?.checked_div(stddev)?
    };

    Some(Bollinger {
        middle,
        upper,
        lower,
        z_score,
    })
}

/// Average true range over `period` bars using Wilder's smoothing. `None`
/// if fewer than `period + 1` bars are available.
pub fn atr(bars: &[Bar], period: usize) -> Option<Decimal> {
    if period == 0 || bars.len() < period.checked_add(1)? {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(bars.len());
    for window in bars.windows(2) {
        let (prev, curr) = (window.first()?, window.get(1)?);
        let high_low = curr.h.checked_sub(curr.l)?;
        let high_prev_close = curr.h.checked_sub(prev.c)?.abs();
        let low_prev_close = curr.l.checked_sub(prev.c)?.abs();
        let true_range = high_low.max(high_prev_close).max(low_prev_close);
        true_ranges.push(true_range);
    }

    let window = true_ranges.get(true_ranges.len().checked_sub(period)?..)?;
    let sum = window
        .iter()
        .try_fold(Decimal::ZERO, |acc, tr| acc.checked_add(*tr))?;
    sum.checked_div(Decimal::from(period as u64))
}

/// Highest high and lowest low across the full bar slice, used for
/// previous-session range levels and breakout range detection.
pub fn rolling_high_low(bars: &[Bar]) -> Option<(Decimal, Decimal)> {
    if bars.is_empty() {
        return None;
    }
    let high = bars.iter().map(|b| b.h).fold(Decimal::MIN, Decimal::max);
    let low = bars.iter().map(|b| b.l).fold(Decimal::MAX, Decimal::min);
    Some((high, low))
}

/// Babylonian-method square root for `Decimal`, used by [`bollinger`] since
/// `rust_decimal` has no built-in `sqrt`. Returns `None` for negative input.
fn decimal_sqrt(value: Decimal) -> Option<Decimal> {
    if value.is_sign_negative() {
        return None;
    }
    if value.is_zero() {
        return Some(Decimal::ZERO);
    }

    let mut guess = value;
    for _ in 0..64 {
        let next = guess
            .checked_add(value.checked_div(guess)?)?
            .checked_div(dec!(2))?;
        if (next.checked_sub(guess)?).abs() < dec!(0.0000000001) {
            return Some(next);
        }
        guess = next;
    }
    Some(guess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(close: Decimal) -> Bar {
        bar_ohlc(close, close, close, close)
    }

    fn bar_ohlc(o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Bar {
        Bar {
            t: Utc::now(),
            o,
            h,
            l,
            c,
            v: 1_000,
        }
    }

    #[test]
    fn sma_averages_last_n_closes() {
        let bars = vec![bar(dec!(10)), bar(dec!(20)), bar(dec!(30))];
        assert_eq!(sma(&bars, 3), Some(dec!(20)));
        assert_eq!(sma(&bars, 2), Some(dec!(25)));
    }

    #[test]
    fn sma_none_when_insufficient_history() {
        let bars = vec![bar(dec!(10))];
        assert_eq!(sma(&bars, 5), None);
    }

    #[test]
    fn rsi_is_100_when_no_losses() {
        let bars = vec![bar(dec!(10)), bar(dec!(11)), bar(dec!(12)), bar(dec!(13))];
        assert_eq!(rsi(&bars, 3), Some(dec!(100)));
    }

    #[test]
    fn rsi_is_zero_when_no_gains() {
        let bars = vec![bar(dec!(13)), bar(dec!(12)), bar(dec!(11)), bar(dec!(10))];
        assert_eq!(rsi(&bars, 3), Some(Decimal::ZERO));
    }

    #[test]
    fn bollinger_flat_series_has_zero_width_and_zero_z_score() {
        let bars = vec![bar(dec!(10)); 20];
        let band = bollinger(&bars, 20, dec!(2)).expect("enough bars");
        assert_eq!(band.middle, dec!(10));
        assert_eq!(band.upper, dec!(10));
        assert_eq!(band.lower, dec!(10));
        assert_eq!(band.z_score, Decimal::ZERO);
    }

    #[test]
    fn atr_of_constant_range_equals_the_range() {
        let bars = vec![
            bar_ohlc(dec!(10), dec!(11), dec!(9), dec!(10)),
            bar_ohlc(dec!(10), dec!(11), dec!(9), dec!(10)),
            bar_ohlc(dec!(10), dec!(11), dec!(9), dec!(10)),
        ];
        assert_eq!(atr(&bars, 2), Some(dec!(2)));
    }

    #[test]
    fn rolling_high_low_scans_the_whole_slice() {
        let bars = vec![
            bar_ohlc(dec!(10), dec!(12), dec!(9), dec!(10)),
            bar_ohlc(dec!(10), dec!(15), dec!(8), dec!(10)),
        ];
        assert_eq!(rolling_high_low(&bars), Some((dec!(15), dec!(8))));
    }
}
