use crate::config::Config;
use crate::error::ApplicationError;
use backtide_domain::engine::backtest::BacktestRunner;
use backtide_domain::engine::result::BacktestResult;
use backtide_domain::errors::BacktestError;
use backtide_domain::repositories::market_data::{BarQuery, MarketDataRepository};
use backtide_domain::value_objects::bar::Bar;
use std::time::Instant;
use tracing::info_span;

/// Loads bars for the configured ticker and date range, then runs the backtest.
pub fn run_backtest(
    config: &Config,
    market_data: &dyn MarketDataRepository,
) -> Result<BacktestResult, ApplicationError> {
    let _span = info_span!(
        "run_backtest",
        run_id = %config.run.run_id,
        ticker = %config.run.ticker,
        strategy = %config.strategy.name
    )
    .entered();

    let engine_config = config.to_backtest_config()?;
    let ticker = engine_config.validate().map_err(BacktestError::from)?;

    let stage_start = Instant::now();
    let bars = market_data
        .load_bars(&BarQuery {
            ticker,
            start: engine_config.start_date,
            end: engine_config.end_date,
        })
        .map_err(ApplicationError::MarketData)?;
    metrics::histogram!("backtide.backtest.load_bars_ms")
        .record(stage_start.elapsed().as_millis() as f64);

    execute(config, &bars)
}

/// Runs the backtest over bars the caller already holds.
pub fn run_backtest_on_bars(
    config: &Config,
    bars: &[Bar],
) -> Result<BacktestResult, ApplicationError> {
    let _span = info_span!(
        "run_backtest",
        run_id = %config.run.run_id,
        ticker = %config.run.ticker,
        strategy = %config.strategy.name
    )
    .entered();
    execute(config, bars)
}

pub(crate) fn execute(config: &Config, bars: &[Bar]) -> Result<BacktestResult, ApplicationError> {
    let engine_config = config.to_backtest_config()?;
    let strategy = config.build_strategy()?;

    let stage_start = Instant::now();
    let result = BacktestRunner::new(engine_config, strategy).run(bars)?;
    let run_ms = stage_start.elapsed().as_millis() as f64;

    metrics::histogram!("backtide.backtest.run_ms").record(run_ms);
    metrics::gauge!("backtide.backtest.bars").set(result.metrics().bars_processed as f64);
    metrics::gauge!("backtide.backtest.trades").set(result.metrics().total_trades as f64);
    metrics::counter!("backtide.backtest.rejected_orders")
        .increment(result.orders().rejected as u64);

    Ok(result)
}
