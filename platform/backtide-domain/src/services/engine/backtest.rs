use crate::entities::account::Account;
use crate::errors::{BacktestError, ValidationError};
use crate::services::analyzers::{AnalyzerInput, PerformanceAnalyzer};
use crate::services::engine::config::BacktestConfig;
use crate::services::engine::result::BacktestResult;
use crate::services::strategy::{BarContext, RunSetup, Strategy};
use crate::value_objects::bar::Bar;
use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::order::OrderStats;
use crate::value_objects::timeframe::Timeframe;
use tracing::{info, info_span, warn};

/// Lifecycle of a runner. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Running,
    Completed,
    Failed,
}

/// Drives one strategy over one bar series against its own ledger.
///
/// A runner is single use: a second `run` returns [`BacktestError::AlreadyRun`].
pub struct BacktestRunner<S: Strategy> {
    config: BacktestConfig,
    strategy: S,
    state: RunState,
}

struct Prepared {
    config: BacktestConfig,
    bars: Vec<Bar>,
    periods_per_year: f64,
}

impl<S: Strategy> BacktestRunner<S> {
    pub fn new(config: BacktestConfig, strategy: S) -> Self {
        Self {
            config,
            strategy,
            state: RunState::Initializing,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Validates the configuration, bars and strategy, then steps through every
    /// bar inside `[start_date, end_date]` in order.
    ///
    /// Bars outside the date range are ignored. Nothing is simulated when
    /// validation fails.
    pub fn run(&mut self, bars: &[Bar]) -> Result<BacktestResult, BacktestError> {
        if self.state != RunState::Initializing {
            return Err(BacktestError::AlreadyRun);
        }

        let span = info_span!(
            "backtest",
            ticker = %self.config.ticker,
            strategy = %self.strategy.name()
        );
        let _guard = span.enter();

        let prepared = match self.prepare(bars) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.state = RunState::Failed;
                warn!(error = %err, "backtest rejected before start");
                return Err(err.into());
            }
        };

        self.state = RunState::Running;
        let result = self.simulate(prepared);
        self.state = RunState::Completed;

        let metrics = result.metrics();
        info!(
            bars = metrics.bars_processed,
            trades = metrics.total_trades,
            rejected = result.orders().rejected,
            total_return = metrics.total_return,
            max_drawdown = metrics.max_drawdown,
            "backtest complete"
        );
        Ok(result)
    }

    fn prepare(&mut self, bars: &[Bar]) -> Result<Prepared, ValidationError> {
        let ticker = self.config.validate()?;
        let (start, end) = (self.config.start_date, self.config.end_date);

        let window: Vec<Bar> = bars
            .iter()
            .filter(|bar| bar.timestamp >= start && bar.timestamp <= end)
            .cloned()
            .collect();
        validate_bars(&window, start, end)?;

        let name = self.strategy.name().to_string();
        if name.trim().is_empty() {
            return Err(ValidationError::MalformedStrategy {
                name,
                reason: "strategy name is empty".to_string(),
            });
        }
        let setup = RunSetup {
            ticker: ticker.clone(),
            initial_capital: self.config.initial_capital,
            commission_rate: self.config.commission_rate,
        };
        self.strategy
            .initialize(&setup)
            .map_err(|reason| ValidationError::MalformedStrategy { name, reason })?;

        let periods_per_year = self.config.metrics.periods_per_year.unwrap_or_else(|| {
            Timeframe::infer(window.iter().map(|bar| bar.timestamp)).periods_per_year()
        });

        let mut config = self.config.clone();
        config.ticker = ticker;
        Ok(Prepared {
            config,
            bars: window,
            periods_per_year,
        })
    }

    fn simulate(&mut self, prepared: Prepared) -> BacktestResult {
        let Prepared {
            config,
            bars,
            periods_per_year,
        } = prepared;
        let policy = config.execution;
        let mut account = Account::new(config.initial_capital);
        let mut orders = OrderStats::default();
        let mut equity = Vec::with_capacity(bars.len());
        let last = bars.len() - 1;

        for (index, bar) in bars.iter().enumerate() {
            let mut ctx = BarContext::new(
                &bars[..=index],
                &mut account,
                config.commission_rate,
                policy,
                &mut orders,
            );
            self.strategy.on_bar(&mut ctx);
            if index == last && policy.liquidate_at_end && ctx.has_position() {
                ctx.sell_all();
            }
            equity.push(EquityPoint::capture(bar, &account));
        }

        let analyzer = PerformanceAnalyzer::new(config.metrics.risk_free_rate, periods_per_year);
        let metrics = analyzer.analyze(&AnalyzerInput {
            equity: &equity,
            trades: account.trades(),
            initial_capital: config.initial_capital,
        });

        BacktestResult::new(
            config,
            self.strategy.name().to_string(),
            metrics,
            equity,
            account.into_trades(),
            orders,
        )
    }
}

/// Requires at least one bar, strictly increasing dates and positive prices.
fn validate_bars(
    bars: &[Bar],
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
) -> Result<(), ValidationError> {
    if bars.is_empty() {
        return Err(ValidationError::EmptySeries { start, end });
    }
    for (index, bar) in bars.iter().enumerate() {
        if let Some(field) = bar.invalid_price_field() {
            return Err(ValidationError::InvalidBar {
                index,
                timestamp: bar.timestamp,
                field,
            });
        }
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(ValidationError::UnorderedBars {
                index,
                timestamp: bar.timestamp,
            });
        }
    }
    Ok(())
}
