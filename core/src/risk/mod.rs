//! Risk & compliance engine (C4, spec §4.4).
//!
//! Gates are evaluated in the order given by the spec; the first `Blocked`
//! wins and short-circuits the remaining gates, `Warning`s accumulate.
//! Arithmetic is checked `Decimal` throughout, matching the teacher's
//! `core::calculators_trade::quantity` idiom applied to position sizing and
//! settlement math instead of rule-based quantity capping.

mod account_cache;
mod frequency;
mod profit_taking;
mod settlement;
mod sizing;

pub use account_cache::AccountBalanceCache;
pub use profit_taking::{ProfitLevel, ProfitTakingCheck, ProfitTakingPlan};

use model::{
    Account, AccountMode, DatabaseFactory, ErrorKind, OrderSide, RuntimeError, Trade, TradeId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Outcome classification for a pre-trade validation (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceResult {
    /// No gate raised a concern.
    Allowed,
    /// A gate flagged a concern but did not block, per its enforcement mode.
    Warning,
    /// A gate blocked the trade outright.
    Blocked,
}

/// `strict` blocks; `warning` logs and lets the trade proceed (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    /// The gate blocks on violation.
    Strict,
    /// The gate only warns on violation.
    Warning,
}

/// Typed configuration for every option in spec.md §6's `risk.*` table.
#[derive(Debug, Clone, Copy)]
pub struct RiskConfig {
    /// Balance below which an account is classified as cash-account mode.
    pub cash_account_threshold: Decimal,
    /// PDT gate enforcement mode.
    pub pdt_enforcement_mode: EnforcementMode,
    /// GFV gate enforcement mode.
    pub gfv_enforcement_mode: EnforcementMode,
    /// Maximum day-trades in a rolling 5-trading-day window before the PDT gate fires.
    pub pdt_day_trade_limit: u32,
    /// Maximum trades per UTC trading day for a cash account.
    pub daily_trade_limit: u32,
    /// Maximum trades per rolling 7-day window for a cash account.
    pub weekly_trade_limit: u32,
    /// Sizing percentage applied when confidence `< 0.4`.
    pub position_size_low_confidence_pct: Decimal,
    /// Sizing percentage applied when `0.4 <= confidence < 0.7`.
    pub position_size_medium_confidence_pct: Decimal,
    /// Sizing percentage applied when confidence `>= 0.7`.
    pub position_size_high_confidence_pct: Decimal,
    /// Hard cap on the fraction of balance any single sizing decision may commit.
    pub max_position_size_pct: Decimal,
    /// T+N settlement days (default 2).
    pub settlement_days: u32,
    /// How long a refreshed account balance is trusted before the next gate-1 refresh.
    pub balance_cache_ttl: Duration,
    /// Profit-taking plan defaults (spec §4.4, consumed by the scheduler's exit loop).
    pub profit_take_levels: [ProfitLevel; 3],
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            cash_account_threshold: dec!(25000),
            pdt_enforcement_mode: EnforcementMode::Strict,
            gfv_enforcement_mode: EnforcementMode::Strict,
            pdt_day_trade_limit: 3,
            daily_trade_limit: 5,
            weekly_trade_limit: 20,
            position_size_low_confidence_pct: dec!(0.01),
            position_size_medium_confidence_pct: dec!(0.025),
            position_size_high_confidence_pct: dec!(0.04),
            max_position_size_pct: dec!(0.10),
            settlement_days: 2,
            balance_cache_ttl: Duration::from_secs(300),
            profit_take_levels: [
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
}

/// Result of a pre-trade `validate` call (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// `true` iff `compliance_result != Blocked`.
    pub ok: bool,
    /// Gate classification.
    pub compliance_result: ComplianceResult,
    /// Human-readable reason, naming the gate(s) that fired.
    pub compliance_message: String,
    /// Sized share quantity, if sizing was requested (confidence supplied).
    pub position_size: Option<i64>,
}

/// Pre-trade validation request (spec §4.4).
#[derive(Debug, Clone)]
pub struct ValidationRequest<'a> {
    /// Ticker symbol.
    pub symbol: &'a str,
    /// Side of the proposed trade.
    pub side: OrderSide,
    /// Caller-suggested quantity; ignored if sizing (confidence) is supplied.
    pub qty: Option<i64>,
    /// Reference price for sizing and settlement math.
    pub price: Decimal,
    /// Strategy confidence, `Some` to request sizing.
    pub confidence: Option<Decimal>,
    /// Whether this trade, if filled, would create a day-trade.
    pub will_create_day_trade: bool,
}

/// The risk & compliance engine (C4). Stateless beyond the balance cache;
/// every other gate re-derives its inputs from the store on each call so
/// there is nothing else to keep consistent across restarts.
#[derive(Debug)]
pub struct RiskEngine {
    config: RiskConfig,
    balance_cache: AccountBalanceCache,
}

impl RiskEngine {
    /// Builds an engine with the given configuration.
    pub fn new(config: RiskConfig) -> Self {
        RiskEngine {
            config,
            balance_cache: AccountBalanceCache::new(config.balance_cache_ttl),
        }
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Gate 1: refreshes `account_id`'s balance from the broker if the cache
    /// has expired, reclassifies cash/margin mode, and persists the result.
    /// `refresh` is only invoked on a cache miss (double-checked within the
    /// cache itself to prevent a thundering-herd refresh, spec §5).
    pub fn refresh_account(
        &self,
        db: &dyn DatabaseFactory,
        account_id: model::AccountId,
        refresh: impl FnOnce() -> Result<(Decimal, Decimal), RuntimeError>,
    ) -> Result<Account, RuntimeError> {
        self.balance_cache.get_or_refresh(account_id, || {
            let (balance, cash) = refresh()?;
            let mode = Account::classify(balance, self.config.cash_account_threshold);
            let mut repo = db.accounts();
            let mut account = repo
                .get(account_id)
                .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
            account.balance = balance;
            account.cash = cash;
            account.mode = mode;
            account.balance_refreshed_at = chrono::Utc::now();
            repo.update(&account)
                .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
            Ok(account)
        })
    }

    /// Runs every pre-trade gate in spec order and returns the combined outcome.
    #[allow(clippy::too_many_lines)]
    pub fn validate(
        &self,
        db: &dyn DatabaseFactory,
        account: &Account,
        request: &ValidationRequest<'_>,
    ) -> Result<ValidationOutcome, RuntimeError> {
        let today = chrono::Utc::now().date_naive();
        let mut warnings: Vec<String> = Vec::new();

        if account.is_cash_account() {
            // Gate 2: PDT.
            let window_start = today - chrono::Duration::days(5);
            let day_trade_count = db
                .day_trades()
                .count_in_window(account.id, window_start, today)
                .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;

            if request.will_create_day_trade && day_trade_count >= self.config.pdt_day_trade_limit {
                let message = format!(
                    "pdt: {day_trade_count} day-trades in the last 5 trading days meets the limit of {}",
                    self.config.pdt_day_trade_limit
                );
                match self.config.pdt_enforcement_mode {
                    EnforcementMode::Strict => {
                        return Ok(blocked(message, None));
                    }
                    EnforcementMode::Warning => warnings.push(message),
                }
            }

            // Gate 3: settlement / GFV.
            let unsettled_absolute = db
                .settlements()
                .sum_unsettled_absolute(account.id, today)
                .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
            let available_settled_cash = account.cash.checked_sub(unsettled_absolute).unwrap_or(Decimal::ZERO);

            match request.side {
                OrderSide::Buy => {
                    let qty = request.qty.unwrap_or(0);
                    let cost = request.price.checked_mul(Decimal::from(qty)).unwrap_or(Decimal::ZERO);
                    if cost > available_settled_cash {
                        let message = format!(
                            "settlement: cost {cost} exceeds available settled cash {available_settled_cash}"
                        );
                        match self.config.gfv_enforcement_mode {
                            EnforcementMode::Strict => return Ok(blocked(message, None)),
                            EnforcementMode::Warning => warnings.push(message),
                        }
                    }
                }
                OrderSide::Sell => {
                    if settlement::sell_would_be_good_faith_violation(db, account.id, request.symbol, today, self.config.settlement_days)? {
                        let message = "gfv: position was funded with unsettled proceeds".to_string();
                        match self.config.gfv_enforcement_mode {
                            EnforcementMode::Strict => return Ok(blocked(message, None)),
                            EnforcementMode::Warning => warnings.push(message),
                        }
                    }
                }
            }

            // Gate 4: trade frequency.
            let counter = frequency::load_counter(db, account.id, today)?;
            if counter.would_exceed_daily(self.config.daily_trade_limit) {
                return Ok(blocked(
                    format!(
                        "frequency: {} trades today meets the daily limit of {}",
                        counter.trades_today, self.config.daily_trade_limit
                    ),
                    None,
                ));
            }
            if counter.would_exceed_weekly(self.config.weekly_trade_limit) {
                return Ok(blocked(
                    format!(
                        "frequency: {} trades this week meets the weekly limit of {}",
                        counter.trades_this_week, self.config.weekly_trade_limit
                    ),
                    None,
                ));
            }
        }

        // Gate 5: position sizing (only when confidence was supplied).
        let position_size = if let Some(confidence) = request.confidence {
            let available_settled_cash = if account.is_cash_account() {
                let unsettled_absolute = db
                    .settlements()
                    .sum_unsettled_absolute(account.id, today)
                    .map_err(|e| RuntimeError::new(ErrorKind::Internal, e.to_string()))?;
                Some(account.cash.checked_sub(unsettled_absolute).unwrap_or(Decimal::ZERO))
            } else {
                None
            };

            let sized = sizing::size_position(&self.config, account.balance, request.price, confidence, available_settled_cash);
            if sized == 0 {
                return Ok(blocked("insufficient_size: sizing produced zero shares".to_string(), None));
            }
            Some(sized)
        } else {
            None
        };

        if warnings.is_empty() {
            Ok(ValidationOutcome {
                ok: true,
                compliance_result: ComplianceResult::Allowed,
                compliance_message: "allowed".to_string(),
                position_size,
            })
        } else {
            Ok(ValidationOutcome {
                ok: true,
                compliance_result: ComplianceResult::Warning,
                compliance_message: warnings.join("; "),
                position_size,
            })
        }
    }

    /// Post-trade bookkeeping (spec §4.4): writes the trade, its settlement
    /// row, an optional day-trade record, all inside one transaction so the
    /// three inserts are atomic.
    #[allow(clippy::too_many_arguments)]
    pub fn record_fill(
        &self,
        db: &dyn DatabaseFactory,
        trade: Trade,
        opened_trade_id: Option<TradeId>,
    ) -> Result<Trade, RuntimeError> {
        settlement::record_fill(db, &self.config, trade, opened_trade_id)
    }
}

fn blocked(message: String, position_size: Option<i64>) -> ValidationOutcome {
    ValidationOutcome {
        ok: false,
        compliance_result: ComplianceResult::Blocked,
        compliance_message: message,
        position_size,
    }
}
