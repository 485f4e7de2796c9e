//! On-disk configuration for the `trust` daemon (spec §6).
//!
//! One typed config struct per crate already exists downstream
//! (`SchedulerConfig`, `RiskConfig`, `SyncConfig`, `HubConfig`); this
//! module is the TOML-facing DTO layer the binary loads with `serde` +
//! `toml` and converts into those, the way the teacher's own CLI loads a
//! single on-disk file into per-area structs rather than scattering
//! environment lookups through the call stack.

use core_runtime::risk::{EnforcementMode, ProfitLevel, RiskConfig};
use core_runtime::strategy::{
    Breakout, LevelBoundedRange, MeanReversion, Momentum, MultiTimeframe, StrategyInstance,
    StrategyKind,
};
use model::BarTimeframe;
use position_sync::SyncConfig;
use rust_decimal::Decimal;
use scheduler::SchedulerConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use ws_hub::HubConfig;

/// Top-level on-disk configuration (spec §6's full option table).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path to the SQLite database file, `~` expanded.
    pub database_path: String,
    /// Directory logs are written under, `~` expanded.
    pub log_dir: String,
    /// Address the `/ws` endpoint binds to when `websocket.enabled`.
    pub bind_addr: String,
    pub scheduler: SchedulerSection,
    pub broker: BrokerSection,
    pub risk: RiskSection,
    pub position_sync: PositionSyncSection,
    pub websocket: WebsocketSection,
    pub strategies: Vec<StrategySpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: "~/.trust/trust.sqlite3".to_string(),
            log_dir: "~/.trust/logs".to_string(),
            bind_addr: "127.0.0.1:8787".to_string(),
            scheduler: SchedulerSection::default(),
            broker: BrokerSection::default(),
            risk: RiskSection::default(),
            position_sync: PositionSyncSection::default(),
            websocket: WebsocketSection::default(),
            strategies: Vec::new(),
        }
    }
}

/// `scheduler.*` (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub enabled: bool,
    pub evaluation_interval_secs: u64,
    pub exit_check_interval_secs: u64,
    pub min_confidence: Decimal,
    pub max_concurrent_trades: usize,
    pub require_broker_connection: bool,
    pub market_hours_only: bool,
    pub bars_per_evaluation: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let d = SchedulerConfig::default();
        SchedulerSection {
            enabled: d.enabled,
            evaluation_interval_secs: d.evaluation_interval.as_secs(),
            exit_check_interval_secs: d.exit_check_interval.as_secs(),
            min_confidence: d.min_confidence,
            max_concurrent_trades: d.max_concurrent_trades,
            require_broker_connection: d.require_broker_connection,
            market_hours_only: d.market_hours_only,
            bars_per_evaluation: d.bars_per_evaluation,
        }
    }
}

impl SchedulerSection {
    fn into_config(self) -> SchedulerConfig {
        let defaults = SchedulerConfig::default();
        SchedulerConfig {
            enabled: self.enabled,
            evaluation_interval: Duration::from_secs(self.evaluation_interval_secs),
            exit_check_interval: Duration::from_secs(self.exit_check_interval_secs),
            min_confidence: self.min_confidence,
            max_concurrent_trades: self.max_concurrent_trades,
            require_broker_connection: self.require_broker_connection,
            market_hours_only: self.market_hours_only,
            bars_per_evaluation: self.bars_per_evaluation,
            ..defaults
        }
    }
}

/// `broker.*` (spec §6). The gateway session parameters; no secret
/// material lives here (see `crate::keys` for the optional gateway token).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    pub host: String,
    pub port: u16,
    pub client_id: u32,
    pub timeout_secs: u64,
    /// If true, `trust run` connects to the gateway at boot; otherwise an
    /// operator issues `trust broker connect` once the daemon is up.
    pub connect_on_start: bool,
}

impl Default for BrokerSection {
    fn default() -> Self {
        BrokerSection {
            host: "127.0.0.1".to_string(),
            port: 7497,
            client_id: 1,
            timeout_secs: 10,
            connect_on_start: true,
        }
    }
}

/// `risk.*` (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    pub cash_account_threshold: Decimal,
    pub pdt_enforcement_mode: String,
    pub gfv_enforcement_mode: String,
    pub pdt_day_trade_limit: u32,
    pub daily_trade_limit: u32,
    pub weekly_trade_limit: u32,
    pub position_size_low_confidence_pct: Decimal,
    pub position_size_medium_confidence_pct: Decimal,
    pub position_size_high_confidence_pct: Decimal,
    pub max_position_size_pct: Decimal,
    pub settlement_days: u32,
    pub balance_cache_ttl_secs: u64,
    pub profit_take_level_1: Decimal,
    pub profit_take_level_2: Decimal,
    pub profit_take_level_3: Decimal,
    pub partial_exit_level_1_pct: Decimal,
    pub partial_exit_level_2_pct: Decimal,
}

impl Default for RiskSection {
    fn default() -> Self {
        let d = RiskConfig::default();
        RiskSection {
            cash_account_threshold: d.cash_account_threshold,
            pdt_enforcement_mode: "strict".to_string(),
            gfv_enforcement_mode: "strict".to_string(),
            pdt_day_trade_limit: d.pdt_day_trade_limit,
            daily_trade_limit: d.daily_trade_limit,
            weekly_trade_limit: d.weekly_trade_limit,
            position_size_low_confidence_pct: d.position_size_low_confidence_pct,
            position_size_medium_confidence_pct: d.position_size_medium_confidence_pct,
            position_size_high_confidence_pct: d.position_size_high_confidence_pct,
            max_position_size_pct: d.max_position_size_pct,
            settlement_days: d.settlement_days,
            balance_cache_ttl_secs: d.balance_cache_ttl.as_secs(),
            profit_take_level_1: d.profit_take_levels[0].threshold_pct,
            profit_take_level_2: d.profit_take_levels[1].threshold_pct,
            profit_take_level_3: d.profit_take_levels[2].threshold_pct,
            partial_exit_level_1_pct: d.profit_take_levels[0].cumulative_exit_fraction,
            partial_exit_level_2_pct: d.profit_take_levels[1].cumulative_exit_fraction,
        }
    }
}

fn parse_enforcement_mode(value: &str) -> EnforcementMode {
    match value {
        "warning" => EnforcementMode::Warning,
        _ => EnforcementMode::Strict,
    }
}

impl RiskSection {
    fn into_config(self) -> RiskConfig {
        RiskConfig {
            cash_account_threshold: self.cash_account_threshold,
            pdt_enforcement_mode: parse_enforcement_mode(&self.pdt_enforcement_mode),
            gfv_enforcement_mode: parse_enforcement_mode(&self.gfv_enforcement_mode),
            pdt_day_trade_limit: self.pdt_day_trade_limit,
            daily_trade_limit: self.daily_trade_limit,
            weekly_trade_limit: self.weekly_trade_limit,
            position_size_low_confidence_pct: self.position_size_low_confidence_pct,
            position_size_medium_confidence_pct: self.position_size_medium_confidence_pct,
            position_size_high_confidence_pct: self.position_size_high_confidence_pct,
            max_position_size_pct: self.max_position_size_pct,
            settlement_days: self.settlement_days,
            balance_cache_ttl: Duration::from_secs(self.balance_cache_ttl_secs),
            profit_take_levels: [
                ProfitLevel {
                    threshold_pct: self.profit_take_level_1,
                    cumulative_exit_fraction: self.partial_exit_level_1_pct,
                },
                ProfitLevel {
                    threshold_pct: self.profit_take_level_2,
                    cumulative_exit_fraction: self.partial_exit_level_2_pct,
                },
                ProfitLevel {
                    threshold_pct: self.profit_take_level_3,
                    cumulative_exit_fraction: Decimal::ONE,
                },
            ],
        }
    }
}

/// `position_sync.*` (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PositionSyncSection {
    pub sync_interval_secs: u64,
    pub sync_on_trade: bool,
    pub sync_on_position_update: bool,
    pub mark_missing_as_closed: bool,
}

impl Default for PositionSyncSection {
    fn default() -> Self {
        let d = SyncConfig::default();
        PositionSyncSection {
            sync_interval_secs: 60,
            sync_on_trade: d.sync_on_trade,
            sync_on_position_update: d.sync_on_position_update,
            mark_missing_as_closed: d.mark_missing_as_closed,
        }
    }
}

impl PositionSyncSection {
    fn into_config(self) -> SyncConfig {
        SyncConfig {
            mark_missing_as_closed: self.mark_missing_as_closed,
            calculate_realized_pnl: true,
            sync_on_trade: self.sync_on_trade,
            sync_on_position_update: self.sync_on_position_update,
        }
    }
}

/// `websocket.*` (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebsocketSection {
    pub enabled: bool,
    pub ping_interval_secs: u64,
    pub max_connections: usize,
    pub price_update_interval_secs: u64,
    pub portfolio_update_interval_secs: u64,
}

impl Default for WebsocketSection {
    fn default() -> Self {
        let d = HubConfig::default();
        WebsocketSection {
            enabled: d.enabled,
            ping_interval_secs: d.ping_interval.as_secs(),
            max_connections: d.max_connections,
            price_update_interval_secs: d.price_update_interval.as_secs(),
            portfolio_update_interval_secs: d.portfolio_update_interval.as_secs(),
        }
    }
}

impl WebsocketSection {
    fn into_config(self) -> HubConfig {
        HubConfig {
            enabled: self.enabled,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            max_connections: self.max_connections,
            price_update_interval: Duration::from_secs(self.price_update_interval_secs),
            portfolio_update_interval: Duration::from_secs(self.portfolio_update_interval_secs),
        }
    }
}

/// One configured `StrategyInstance` (spec §3, §4.3), tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategySpec {
    pub id: String,
    pub symbol: String,
    pub timeframe: BarTimeframe,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: StrategyKindSpec,
}

fn default_true() -> bool {
    true
}

/// Strategy-kind tagged variant (spec §4.3's five designs; spec.md §9's
/// "dynamic configuration dicts" redesign flag becomes this closed,
/// `serde(tag)`-discriminated enum instead of an untyped dict).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyKindSpec {
    LevelBoundedRange {
        #[serde(default)]
        proximity_pct: Option<Decimal>,
        #[serde(default)]
        stop_loss_pct: Option<Decimal>,
        #[serde(default)]
        volume_confirmation_multiplier: Option<Decimal>,
    },
    Momentum {
        #[serde(default)]
        rsi_period: Option<usize>,
        #[serde(default)]
        rsi_floor: Option<Decimal>,
        #[serde(default)]
        rsi_ceiling: Option<Decimal>,
        #[serde(default)]
        volume_lookback: Option<usize>,
        #[serde(default)]
        volume_multiplier: Option<Decimal>,
        #[serde(default)]
        stop_loss_pct: Option<Decimal>,
    },
    MeanReversion {
        #[serde(default)]
        period: Option<usize>,
        #[serde(default)]
        stddev_multiplier: Option<Decimal>,
        #[serde(default)]
        entry_z: Option<Decimal>,
    },
    Breakout {
        #[serde(default)]
        range_lookback: Option<usize>,
        #[serde(default)]
        atr_period: Option<usize>,
        #[serde(default)]
        atr_stop_multiplier: Option<Decimal>,
        #[serde(default)]
        volume_multiplier: Option<Decimal>,
    },
    MultiTimeframe {
        #[serde(default)]
        bars_per_higher_period: Option<usize>,
        #[serde(default)]
        trend_ema_period: Option<usize>,
        #[serde(default)]
        timing_rsi_period: Option<usize>,
        #[serde(default)]
        timing_rsi_threshold: Option<Decimal>,
        #[serde(default)]
        stop_loss_pct: Option<Decimal>,
    },
}

impl StrategyKindSpec {
    fn into_kind(self) -> StrategyKind {
        match self {
            StrategyKindSpec::LevelBoundedRange { proximity_pct, stop_loss_pct, volume_confirmation_multiplier } => {
                let base = LevelBoundedRange::default();
                StrategyKind::LevelBoundedRange(LevelBoundedRange {
                    proximity_pct: proximity_pct.unwrap_or(base.proximity_pct),
                    stop_loss_pct: stop_loss_pct.unwrap_or(base.stop_loss_pct),
                    volume_confirmation_multiplier: volume_confirmation_multiplier
                        .or(base.volume_confirmation_multiplier),
                })
            }
            StrategyKindSpec::Momentum {
                rsi_period,
                rsi_floor,
                rsi_ceiling,
                volume_lookback,
                volume_multiplier,
                stop_loss_pct,
            } => {
                let base = Momentum::default();
                StrategyKind::Momentum(Momentum {
                    rsi_period: rsi_period.unwrap_or(base.rsi_period),
                    rsi_floor: rsi_floor.unwrap_or(base.rsi_floor),
                    rsi_ceiling: rsi_ceiling.unwrap_or(base.rsi_ceiling),
                    volume_lookback: volume_lookback.unwrap_or(base.volume_lookback),
                    volume_multiplier: volume_multiplier.unwrap_or(base.volume_multiplier),
                    stop_loss_pct: stop_loss_pct.unwrap_or(base.stop_loss_pct),
                })
            }
            StrategyKindSpec::MeanReversion { period, stddev_multiplier, entry_z } => {
                let base = MeanReversion::default();
                StrategyKind::MeanReversion(MeanReversion {
                    period: period.unwrap_or(base.period),
                    stddev_multiplier: stddev_multiplier.unwrap_or(base.stddev_multiplier),
                    entry_z: entry_z.unwrap_or(base.entry_z),
                })
            }
            StrategyKindSpec::Breakout { range_lookback, atr_period, atr_stop_multiplier, volume_multiplier } => {
                let base = Breakout::default();
                StrategyKind::Breakout(Breakout {
                    range_lookback: range_lookback.unwrap_or(base.range_lookback),
                    atr_period: atr_period.unwrap_or(base.atr_period),
                    atr_stop_multiplier: atr_stop_multiplier.unwrap_or(base.atr_stop_multiplier),
                    volume_multiplier: volume_multiplier.unwrap_or(base.volume_multiplier),
                })
            }
            StrategyKindSpec::MultiTimeframe {
                bars_per_higher_period,
                trend_ema_period,
                timing_rsi_period,
                timing_rsi_threshold,
                stop_loss_pct,
            } => {
                let base = MultiTimeframe::default();
                StrategyKind::MultiTimeframe(MultiTimeframe {
                    bars_per_higher_period: bars_per_higher_period.unwrap_or(base.bars_per_higher_period),
                    trend_ema_period: trend_ema_period.unwrap_or(base.trend_ema_period),
                    timing_rsi_period: timing_rsi_period.unwrap_or(base.timing_rsi_period),
                    timing_rsi_threshold: timing_rsi_threshold.unwrap_or(base.timing_rsi_threshold),
                    stop_loss_pct: stop_loss_pct.unwrap_or(base.stop_loss_pct),
                })
            }
        }
    }
}

impl StrategySpec {
    /// Converts this on-disk entry into a `core_runtime` `StrategyInstance`.
    pub fn into_instance(self) -> StrategyInstance {
        StrategyInstance {
            id: self.id,
            kind: self.kind.into_kind(),
            symbol: self.symbol,
            timeframe: self.timeframe,
            enabled: self.enabled,
        }
    }
}

/// Failure loading or parsing `~/.trust/config.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

impl AppConfig {
    /// Loads `path` if it exists; otherwise returns the documented defaults
    /// (spec §6: every option has a default, a missing file is not an error).
    pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Expands `~` in `database_path`.
    pub fn database_path(&self) -> String {
        shellexpand::tilde(&self.database_path).into_owned()
    }

    /// Expands `~` in `log_dir`.
    pub fn log_dir(&self) -> String {
        shellexpand::tilde(&self.log_dir).into_owned()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.scheduler.clone().into_config()
    }

    pub fn risk_config(&self) -> RiskConfig {
        self.risk.clone().into_config()
    }

    pub fn sync_config(&self) -> SyncConfig {
        self.position_sync.clone().into_config()
    }

    pub fn hub_config(&self) -> HubConfig {
        self.websocket.clone().into_config()
    }

    pub fn broker_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.broker.timeout_secs)
    }

    /// Builds the configured `StrategyInstance`s in file order.
    pub fn strategy_instances(&self) -> Vec<StrategyInstance> {
        self.strategies.iter().cloned().map(StrategySpec::into_instance).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = AppConfig::default();
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.evaluation_interval_secs, 60);
        assert_eq!(config.risk.cash_account_threshold, Decimal::from(25_000));
        assert_eq!(config.position_sync.sync_on_trade, true);
        assert_eq!(config.websocket.max_connections, 100);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/trust-config-test.toml")).expect("defaults");
        assert_eq!(config.broker.port, 7497);
    }

    #[test]
    fn parses_a_full_config_with_one_strategy() {
        let toml_text = r#"
            database_path = "~/.trust/test.sqlite3"

            [scheduler]
            enabled = true
            min_confidence = "0.6"

            [broker]
            host = "127.0.0.1"
            port = 4002
            client_id = 7

            [[strategies]]
            id = "mr1"
            symbol = "AAPL"
            timeframe = "one_minute"
            kind = "mean_reversion"
            period = 10
        "#;

        let config: AppConfig = toml::from_str(toml_text).expect("valid config");
        assert!(config.scheduler.enabled);
        assert_eq!(config.broker.port, 4002);
        assert_eq!(config.strategies.len(), 1);

        let instances = config.strategy_instances();
        match &instances[0].kind {
            StrategyKind::MeanReversion(m) => assert_eq!(m.period, 10),
            other => panic!("expected mean reversion, got {other:?}"),
        }
    }

    #[test]
    fn enforcement_mode_defaults_to_strict_on_unknown_value() {
        assert!(matches!(parse_enforcement_mode("bogus"), EnforcementMode::Strict));
        assert!(matches!(parse_enforcement_mode("warning"), EnforcementMode::Warning));
    }
}
