use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// One rung of a profit-taking ladder: once price rises `threshold_pct`
/// above entry, the plan should have exited `cumulative_exit_fraction` of
/// the *original* position quantity, cumulatively (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitLevel {
    /// Fractional gain above entry price that triggers this level.
    pub threshold_pct: Decimal,
    /// Fraction of the original quantity that should have exited by this level.
    pub cumulative_exit_fraction: Decimal,
}

/// A profit-taking plan attached to an open position at entry time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitTakingPlan {
    /// Price the position was entered at.
    pub entry_price: Decimal,
    /// Quantity held when the position was opened.
    pub original_qty: i64,
    /// Ladder of profit-taking levels, evaluated in order.
    pub levels: [ProfitLevel; 3],
}

/// Outcome of checking a plan against the current price and remaining quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitTakingCheck {
    /// Whether a partial exit should happen now.
    pub should_exit: bool,
    /// Index (0-based) of the level that triggered, if any.
    pub level: Option<u8>,
    /// Shares to sell right now to bring the position to this level's target.
    pub qty_to_exit: i64,
    /// Shares that would remain open after this exit.
    pub remaining_qty_after: i64,
}

fn no_exit(remaining_qty: i64) -> ProfitTakingCheck {
    ProfitTakingCheck {
        should_exit: false,
        level: None,
        qty_to_exit: 0,
        remaining_qty_after: remaining_qty,
    }
}

/// Checks `plan` against `current_price` and the position's `remaining_qty`.
///
/// This is purely a function of its inputs — it holds no state of its own —
/// so re-calling it after a partial exit already took the position to a
/// level's target is a no-op: the already-sold quantity is inferred from
/// `original_qty - remaining_qty`, and a level only fires again once the
/// cumulative target it names exceeds what has already been sold.
pub fn check_profit_levels(
    current_price: Decimal,
    plan: &ProfitTakingPlan,
    remaining_qty: i64,
) -> ProfitTakingCheck {
    if plan.entry_price <= Decimal::ZERO || plan.original_qty <= 0 || remaining_qty <= 0 {
        return no_exit(remaining_qty);
    }

    let qty_sold_so_far = plan.original_qty.saturating_sub(remaining_qty);

    // Walk from the highest level down: the furthest threshold the price has
    // reached determines the cumulative target, so a price move that skips
    // straight past an intermediate level sells up to that highest target in
    // one shot rather than stopping at the first level crossed.
    for (index, level) in plan.levels.iter().enumerate().rev() {
        let Some(trigger_price) = plan
            .entry_price
            .checked_mul(Decimal::ONE.checked_add(level.threshold_pct).unwrap_or(Decimal::ONE))
        else {
            continue;
        };
        if current_price < trigger_price {
            continue;
        }

        let Some(target_qty_sold_decimal) =
            Decimal::from(plan.original_qty).checked_mul(level.cumulative_exit_fraction)
        else {
            continue;
        };
        let target_qty_sold = target_qty_sold_decimal.round().to_i64().unwrap_or(0);

        if target_qty_sold <= qty_sold_so_far {
            return no_exit(remaining_qty);
        }

        let qty_to_exit = (target_qty_sold - qty_sold_so_far).min(remaining_qty);
        if qty_to_exit <= 0 {
            return no_exit(remaining_qty);
        }

        return ProfitTakingCheck {
            should_exit: true,
            level: Some(u8::try_from(index).unwrap_or(u8::MAX)),
            qty_to_exit,
            remaining_qty_after: remaining_qty.saturating_sub(qty_to_exit),
        };
    }

    no_exit(remaining_qty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn plan() -> ProfitTakingPlan {
        ProfitTakingPlan {
            entry_price: dec!(100),
            original_qty: 100,
            levels: [
                ProfitLevel {
                    threshold_pct: dec!(0.05),
                    cumulative_exit_fraction: dec!(0.25),
                },
                ProfitLevel {
                    threshold_pct: dec!(0.10),
                    cumulative_exit_fraction: dec!(0.75),
                },
                ProfitLevel {
                    threshold_pct: dec!(0.20),
                    cumulative_exit_fraction: dec!(1.00),
                },
            ],
        }
    }

    #[test]
    fn below_first_threshold_does_nothing() {
        let check = check_profit_levels(dec!(102), &plan(), 100);
        assert!(!check.should_exit);
    }

    #[test]
    fn first_level_sells_a_quarter() {
        let check = check_profit_levels(dec!(105), &plan(), 100);
        assert!(check.should_exit);
        assert_eq!(check.level, Some(0));
        assert_eq!(check.qty_to_exit, 25);
        assert_eq!(check.remaining_qty_after, 75);
    }

    #[test]
    fn re_checking_after_the_exit_is_idempotent() {
        let first = check_profit_levels(dec!(105), &plan(), 100);
        assert!(first.should_exit);
        let second = check_profit_levels(dec!(105), &plan(), first.remaining_qty_after);
        assert!(!second.should_exit);
    }

    #[test]
    fn jumping_straight_to_the_second_level_sells_the_cumulative_difference() {
        // Price jumps straight past the first level to the second without an
        // intervening exit: the plan should sell up to the second level's
        // cumulative target in one shot, not just that level's own slice.
        let check = check_profit_levels(dec!(111), &plan(), 100);
        assert!(check.should_exit);
        assert_eq!(check.level, Some(1));
        assert_eq!(check.qty_to_exit, 75);
        assert_eq!(check.remaining_qty_after, 25);
    }

    #[test]
    fn final_level_exits_the_full_remaining_position() {
        let check = check_profit_levels(dec!(121), &plan(), 25);
        assert!(check.should_exit);
        assert_eq!(check.level, Some(2));
        assert_eq!(check.qty_to_exit, 25);
        assert_eq!(check.remaining_qty_after, 0);
    }
}
