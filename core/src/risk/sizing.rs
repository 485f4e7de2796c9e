use super::RiskConfig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Gate 5: confidence-tiered position sizing (spec §4.4).
///
/// Maps `confidence` to a sizing percentage, converts that into a notional
/// (`balance * pct`), divides by `price` and floors to whole shares, then
/// clamps by `max_position_size_pct` of balance and, for cash accounts, by
/// `available_settled_cash`. Returns `0` when the price or caps leave no
/// room for even one share.
pub fn size_position(
    config: &RiskConfig,
    balance: Decimal,
    price: Decimal,
    confidence: Decimal,
    available_settled_cash: Option<Decimal>,
) -> i64 {
    if price <= Decimal::ZERO || balance <= Decimal::ZERO {
        return 0;
    }

    let pct = if confidence >= dec!(0.7) {
        config.position_size_high_confidence_pct
    } else if confidence >= dec!(0.4) {
        config.position_size_medium_confidence_pct
    } else {
        config.position_size_low_confidence_pct
    };

    let Some(mut size_usd) = balance.checked_mul(pct) else {
        return 0;
    };

    let Some(max_usd) = balance.checked_mul(config.max_position_size_pct) else {
        return 0;
    };
    if size_usd > max_usd {
        size_usd = max_usd;
    }

    if let Some(available) = available_settled_cash {
        if size_usd > available {
            size_usd = available;
        }
    }

    if size_usd <= Decimal::ZERO {
        return 0;
    }

    let Some(shares) = size_usd.checked_div(price) else {
        return 0;
    };
    shares.trunc().to_i64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_confidence_sizes_smaller_than_high_confidence() {
        let config = RiskConfig::default();
        let low = size_position(&config, dec!(100000), dec!(50), dec!(0.2), None);
        let high = size_position(&config, dec!(100000), dec!(50), dec!(0.9), None);
        assert!(low < high);
    }

    #[test]
    fn caps_at_max_position_size_pct() {
        let mut config = RiskConfig::default();
        config.position_size_high_confidence_pct = dec!(0.50);
        config.max_position_size_pct = dec!(0.10);
        let shares = size_position(&config, dec!(100000), dec!(10), dec!(0.9), None);
        // max 10% of 100000 = 10000, at $10/share => 1000 shares, not 5000.
        assert_eq!(shares, 1000);
    }

    #[test]
    fn clamps_to_available_settled_cash() {
        let config = RiskConfig::default();
        let shares = size_position(&config, dec!(100000), dec!(100), dec!(0.9), Some(dec!(150)));
        assert_eq!(shares, 1);
    }

    #[test]
    fn zero_price_sizes_to_zero() {
        let config = RiskConfig::default();
        assert_eq!(size_position(&config, dec!(100000), Decimal::ZERO, dec!(0.9), None), 0);
    }
}
