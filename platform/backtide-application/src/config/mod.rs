use crate::error::ApplicationError;
use backtide_domain::engine::config::{BacktestConfig, MetricsConfig as EngineMetricsConfig};
use backtide_domain::engine::execution::{
    CashShortfall, ExecutionPolicy, OversizedSell, ShareRounding,
};
use backtide_domain::services::strategy::{
    BuyAndHold, HoldStrategy, RsiThreshold, SmaCrossover, StrategyKind, DEFAULT_RSI_LOWER,
    DEFAULT_RSI_PERIOD, DEFAULT_RSI_UPPER,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub run: RunConfig,
    pub costs: Option<CostsConfig>,
    pub execution: Option<ExecutionConfig>,
    pub metrics: Option<MetricsConfig>,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub run_id: String,
    pub ticker: String,
    /// `YYYY-MM-DD`.
    pub start_date: String,
    /// `YYYY-MM-DD`, inclusive.
    pub end_date: String,
    pub initial_capital: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CostsConfig {
    pub commission_rate: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    pub share_rounding: Option<ShareRounding>,
    pub cash_shortfall: Option<CashShortfall>,
    pub oversized_sell: Option<OversizedSell>,
    pub liquidate_at_end: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    pub risk_free_rate: Option<f64>,
    pub periods_per_year: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    /// One of `hold`, `buy_and_hold`, `sma_crossover`, `rsi_threshold`.
    pub name: String,
    /// Share of cash committed per entry.
    pub fraction: Option<f64>,
    pub short_window: Option<u64>,
    pub long_window: Option<u64>,
    pub rsi_period: Option<u64>,
    pub rsi_lower: Option<f64>,
    pub rsi_upper: Option<f64>,
}

impl Config {
    /// Translates the file sections into the engine's run configuration.
    ///
    /// Only dates are checked here; the engine validates everything else
    /// when the run starts.
    pub fn to_backtest_config(&self) -> Result<BacktestConfig, ApplicationError> {
        let start = parse_date("run.start_date", &self.run.start_date)?;
        let end = parse_date("run.end_date", &self.run.end_date)?;

        let mut config = BacktestConfig::new(self.run.ticker.clone(), start, end);
        if let Some(capital) = self.run.initial_capital {
            config = config.with_initial_capital(capital);
        }
        if let Some(costs) = &self.costs {
            config = config.with_commission_rate(costs.commission_rate);
        }
        if let Some(execution) = &self.execution {
            let defaults = ExecutionPolicy::default();
            config = config.with_execution(ExecutionPolicy {
                share_rounding: execution.share_rounding.unwrap_or(defaults.share_rounding),
                cash_shortfall: execution.cash_shortfall.unwrap_or(defaults.cash_shortfall),
                oversized_sell: execution.oversized_sell.unwrap_or(defaults.oversized_sell),
                liquidate_at_end: execution
                    .liquidate_at_end
                    .unwrap_or(defaults.liquidate_at_end),
            });
        }
        if let Some(metrics) = &self.metrics {
            config = config.with_metrics(EngineMetricsConfig {
                risk_free_rate: metrics.risk_free_rate.unwrap_or(0.0),
                periods_per_year: metrics.periods_per_year,
            });
        }
        Ok(config)
    }

    pub fn build_strategy(&self) -> Result<StrategyKind, ApplicationError> {
        let s = &self.strategy;
        let fraction = s.fraction.unwrap_or(1.0);
        let strategy = match s.name.trim().to_lowercase().as_str() {
            "hold" => StrategyKind::Hold(HoldStrategy),
            "buy_and_hold" => StrategyKind::BuyAndHold(BuyAndHold::new(fraction)),
            "sma_crossover" => {
                let short = window("strategy.short_window", s.short_window)?;
                let long = window("strategy.long_window", s.long_window)?;
                StrategyKind::SmaCrossover(SmaCrossover::new(short, long).with_fraction(fraction))
            }
            "rsi_threshold" => {
                let period = match s.rsi_period {
                    Some(_) => window("strategy.rsi_period", s.rsi_period)?,
                    None => DEFAULT_RSI_PERIOD,
                };
                StrategyKind::RsiThreshold(
                    RsiThreshold::new(
                        period,
                        s.rsi_lower.unwrap_or(DEFAULT_RSI_LOWER),
                        s.rsi_upper.unwrap_or(DEFAULT_RSI_UPPER),
                    )
                    .with_fraction(fraction),
                )
            }
            other => {
                return Err(ApplicationError::Config(format!(
                    "unsupported strategy.name: {other} (expected hold|buy_and_hold|sma_crossover|rsi_threshold)"
                )))
            }
        };
        Ok(strategy)
    }
}

fn window(field: &str, value: Option<u64>) -> Result<usize, ApplicationError> {
    let value =
        value.ok_or_else(|| ApplicationError::Config(format!("{field} is required")))?;
    usize::try_from(value)
        .map_err(|_| ApplicationError::Config(format!("{field} out of range: {value}")))
}

pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ApplicationError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|err| {
        ApplicationError::Config(format!(
            "{field} must be a YYYY-MM-DD date, got '{raw}': {err}"
        ))
    })
}

pub fn load_config(path: &Path) -> Result<Config, ApplicationError> {
    let (config, _source) = load_config_with_source(path)?;
    Ok(config)
}

pub fn load_config_with_source(path: &Path) -> Result<(Config, String), ApplicationError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        ApplicationError::Config(format!("failed to read config {}: {err}", path.display()))
    })?;
    let config = toml::from_str(&contents).map_err(|err| {
        ApplicationError::Config(format!("failed to parse TOML {}: {err}", path.display()))
    })?;
    Ok((config, contents))
}

pub fn load_config_from_str(raw: &str) -> Result<Config, ApplicationError> {
    toml::from_str(raw)
        .map_err(|err| ApplicationError::Config(format!("failed to parse TOML: {err}")))
}

pub fn to_toml_pretty(config: &Config) -> Result<String, ApplicationError> {
    toml::to_string_pretty(config).map_err(|err| {
        ApplicationError::Config(format!("failed to serialize config as TOML: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::{load_config, load_config_from_str, to_toml_pretty, Config};
    use crate::error::ApplicationError;
    use backtide_domain::engine::execution::{CashShortfall, OversizedSell, ShareRounding};
    use backtide_domain::services::strategy::{Strategy, StrategyKind};
    use chrono::NaiveDate;

    const FULL: &str = r#"
[run]
run_id = "aapl_rsi"
ticker = "aapl"
start_date = "2023-01-01"
end_date = "2023-12-31"
initial_capital = 25000.0

[costs]
commission_rate = 0.001

[execution]
share_rounding = "fractional"
cash_shortfall = "fill_affordable"
oversized_sell = "reject"
liquidate_at_end = true

[metrics]
risk_free_rate = 0.02

[strategy]
name = "rsi_threshold"
rsi_lower = 25.0
"#;

    fn parse_config(toml_str: &str) -> Config {
        toml::from_str(toml_str).expect("config should parse")
    }

    #[test]
    fn parse_full_config_and_translate() {
        let config = parse_config(FULL);
        let engine = config.to_backtest_config().expect("translate");
        assert_eq!(engine.ticker, "aapl");
        assert_eq!(
            engine.start_date,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
        );
        assert_eq!(engine.initial_capital, 25_000.0);
        assert_eq!(engine.commission_rate, 0.001);
        assert_eq!(engine.execution.share_rounding, ShareRounding::Fractional);
        assert_eq!(engine.execution.cash_shortfall, CashShortfall::FillAffordable);
        assert_eq!(engine.execution.oversized_sell, OversizedSell::Reject);
        assert!(engine.execution.liquidate_at_end);
        assert_eq!(engine.metrics.risk_free_rate, 0.02);
        assert_eq!(engine.metrics.periods_per_year, None);

        let strategy = config.build_strategy().expect("strategy");
        assert!(matches!(strategy, StrategyKind::RsiThreshold(_)));
        assert_eq!(strategy.name(), "rsi_threshold");
    }

    #[test]
    fn minimal_config_uses_engine_defaults() {
        let config = parse_config(
            r#"
[run]
run_id = "x"
ticker = "MSFT"
start_date = "2024-01-01"
end_date = "2024-02-01"

[strategy]
name = "hold"
"#,
        );
        let engine = config.to_backtest_config().unwrap();
        assert_eq!(engine.initial_capital, 10_000.0);
        assert_eq!(engine.commission_rate, 0.0);
        assert_eq!(engine.execution.share_rounding, ShareRounding::Whole);
        assert!(!engine.execution.liquidate_at_end);
    }

    #[test]
    fn parse_config_rejects_unknown_fields() {
        let err = load_config_from_str(
            r#"
[run]
run_id = "x"
ticker = "MSFT"
start_date = "2024-01-01"
end_date = "2024-02-01"
slippage_bps = 5.0

[strategy]
name = "hold"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("unknown field"));
    }

    #[test]
    fn malformed_dates_are_config_errors() {
        let mut config = parse_config(FULL);
        config.run.start_date = "01/02/2023".to_string();
        let err = config.to_backtest_config().unwrap_err();
        assert!(matches!(err, ApplicationError::Config(_)));
        assert!(err.to_string().contains("run.start_date"));
    }

    #[test]
    fn unknown_strategy_and_missing_windows_are_rejected() {
        let mut config = parse_config(FULL);
        config.strategy.name = "martingale".to_string();
        assert!(matches!(
            config.build_strategy(),
            Err(ApplicationError::Config(_))
        ));

        config.strategy.name = "sma_crossover".to_string();
        config.strategy.short_window = Some(5);
        let err = config.build_strategy().err().expect("missing long window");
        assert!(err.to_string().contains("strategy.long_window"));
    }

    #[test]
    fn load_config_reads_file_and_reports_missing_path() {
        let dir = std::env::temp_dir().join(format!("backtide_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("run.toml");
        std::fs::write(&path, FULL).expect("write config");

        let config = load_config(&path).expect("load");
        assert_eq!(config, parse_config(FULL));

        let err = load_config(&dir.join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn pretty_toml_round_trips() {
        let config = parse_config(FULL);
        let rendered = to_toml_pretty(&config).unwrap();
        assert_eq!(parse_config(&rendered), config);
    }
}
