use chrono::NaiveDate;
use thiserror::Error;

/// Problems detected before the simulation loop starts. A run that fails
/// validation never touches a ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("ticker must be a non-empty string")]
    EmptyTicker,
    #[error("invalid ticker: {0}")]
    InvalidTicker(String),
    #[error("start_date ({start}) must be before or equal to end_date ({end})")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("initial_capital must be positive, got {0}")]
    NonPositiveCapital(f64),
    #[error("commission_rate must be in [0, 1), got {0}")]
    InvalidCommission(f64),
    #[error("risk_free_rate must be finite, got {0}")]
    InvalidRiskFreeRate(f64),
    #[error("periods_per_year must be positive, got {0}")]
    InvalidPeriodsPerYear(f64),
    #[error("malformed strategy `{name}`: {reason}")]
    MalformedStrategy { name: String, reason: String },
    #[error("no bars between {start} and {end}")]
    EmptySeries { start: NaiveDate, end: NaiveDate },
    #[error("bar {index} ({timestamp}) is not after the previous bar")]
    UnorderedBars { index: usize, timestamp: NaiveDate },
    #[error("bar {index} ({timestamp}) has invalid {field} price")]
    InvalidBar {
        index: usize,
        timestamp: NaiveDate,
        field: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BacktestError {
    #[error("invalid backtest configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error("backtest runner has already been used")]
    AlreadyRun,
}

impl BacktestError {
    pub fn is_validation(&self) -> bool {
        matches!(self, BacktestError::Validation(_))
    }
}
