use backtide_domain::errors::BacktestError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Backtest(#[from] BacktestError),
    #[error("market data error: {0}")]
    MarketData(String),
    #[error("sweep error: {0}")]
    Sweep(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApplicationError {
    /// True when the failure came from validating the run before any bar was simulated.
    pub fn is_validation(&self) -> bool {
        matches!(self, ApplicationError::Backtest(err) if err.is_validation())
    }
}
