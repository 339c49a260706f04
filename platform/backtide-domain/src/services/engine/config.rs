use crate::errors::ValidationError;
use crate::services::engine::execution::ExecutionPolicy;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;

const TICKER_MAX_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Annual rate, spread evenly over the periods of a year.
    pub risk_free_rate: f64,
    /// Overrides the factor inferred from the bar interval.
    pub periods_per_year: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub execution: ExecutionPolicy,
    pub metrics: MetricsConfig,
}

impl BacktestConfig {
    pub fn new(ticker: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            start_date,
            end_date,
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            commission_rate: 0.0,
            execution: ExecutionPolicy::default(),
            metrics: MetricsConfig::default(),
        }
    }

    pub fn with_initial_capital(mut self, initial_capital: f64) -> Self {
        self.initial_capital = initial_capital;
        self
    }

    pub fn with_commission_rate(mut self, commission_rate: f64) -> Self {
        self.commission_rate = commission_rate;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionPolicy) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = metrics;
        self
    }

    /// Checks every scalar setting and returns the normalized ticker.
    pub fn validate(&self) -> Result<String, ValidationError> {
        let ticker = normalize_ticker(&self.ticker)?;
        if self.start_date > self.end_date {
            return Err(ValidationError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(ValidationError::NonPositiveCapital(self.initial_capital));
        }
        if !self.commission_rate.is_finite() || !(0.0..1.0).contains(&self.commission_rate) {
            return Err(ValidationError::InvalidCommission(self.commission_rate));
        }
        if !self.metrics.risk_free_rate.is_finite() {
            return Err(ValidationError::InvalidRiskFreeRate(
                self.metrics.risk_free_rate,
            ));
        }
        if let Some(periods) = self.metrics.periods_per_year {
            if !periods.is_finite() || periods <= 0.0 {
                return Err(ValidationError::InvalidPeriodsPerYear(periods));
            }
        }
        Ok(ticker)
    }
}

/// Trims and upper-cases a ticker; allows `A-Z`, digits and `-._&`, up to ten characters.
pub fn normalize_ticker(raw: &str) -> Result<String, ValidationError> {
    let ticker = raw.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(ValidationError::EmptyTicker);
    }
    if ticker.chars().count() > TICKER_MAX_LEN {
        return Err(ValidationError::InvalidTicker(ticker));
    }
    let allowed = |c: char| c.is_ascii_uppercase() || c.is_ascii_digit() || "-._&".contains(c);
    if !ticker.chars().all(allowed) {
        return Err(ValidationError::InvalidTicker(ticker));
    }
    Ok(ticker)
}
