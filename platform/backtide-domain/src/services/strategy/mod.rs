pub mod context;

pub use context::BarContext;

use crate::services::features::{sma, RollingRsi};
use crate::value_objects::order::OrderSize;

/// Run facts a strategy may inspect before the first bar. No ledger access.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSetup {
    pub ticker: String,
    pub initial_capital: f64,
    pub commission_rate: f64,
}

pub trait Strategy {
    fn name(&self) -> &str;

    /// Called once before the first bar. An `Err` aborts the run as malformed.
    fn initialize(&mut self, _setup: &RunSetup) -> Result<(), String> {
        Ok(())
    }

    fn on_bar(&mut self, _ctx: &mut BarContext<'_>) {}
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn initialize(&mut self, setup: &RunSetup) -> Result<(), String> {
        (**self).initialize(setup)
    }

    fn on_bar(&mut self, ctx: &mut BarContext<'_>) {
        (**self).on_bar(ctx)
    }
}

fn check_fraction(fraction: f64) -> Result<(), String> {
    if fraction.is_finite() && fraction > 0.0 && fraction <= 1.0 {
        Ok(())
    } else {
        Err(format!("fraction must be in (0, 1], got {fraction}"))
    }
}

pub struct HoldStrategy;

impl Strategy for HoldStrategy {
    fn name(&self) -> &str {
        "hold"
    }
}

/// Spends `fraction` of cash on the first bar and holds.
pub struct BuyAndHold {
    fraction: f64,
    has_bought: bool,
}

impl BuyAndHold {
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction,
            has_bought: false,
        }
    }
}

impl Default for BuyAndHold {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn initialize(&mut self, _setup: &RunSetup) -> Result<(), String> {
        self.has_bought = false;
        check_fraction(self.fraction)
    }

    fn on_bar(&mut self, ctx: &mut BarContext<'_>) {
        if self.has_bought {
            return;
        }
        self.has_bought = true;
        ctx.buy(OrderSize::PercentOfCash(self.fraction));
    }
}

/// Goes long when the short average crosses above the long one and exits
/// on the reverse cross.
pub struct SmaCrossover {
    short_window: usize,
    long_window: usize,
    fraction: f64,
}

impl SmaCrossover {
    pub fn new(short_window: usize, long_window: usize) -> Self {
        Self {
            short_window,
            long_window,
            fraction: 1.0,
        }
    }

    pub fn with_fraction(mut self, fraction: f64) -> Self {
        self.fraction = fraction;
        self
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn initialize(&mut self, _setup: &RunSetup) -> Result<(), String> {
        if self.short_window == 0 || self.short_window >= self.long_window {
            return Err(format!(
                "short_window ({}) must be positive and below long_window ({})",
                self.short_window, self.long_window
            ));
        }
        check_fraction(self.fraction)
    }

    fn on_bar(&mut self, ctx: &mut BarContext<'_>) {
        let history = ctx.history();
        if history.len() < self.long_window {
            return;
        }
        let closes: Vec<f64> = history[history.len() - self.long_window..]
            .iter()
            .map(|bar| bar.close)
            .collect();
        let (Some(short), Some(long)) = (
            sma(&closes, self.short_window),
            sma(&closes, self.long_window),
        ) else {
            return;
        };

        if short > long && !ctx.has_position() {
            ctx.buy(OrderSize::PercentOfCash(self.fraction));
        } else if short < long && ctx.has_position() {
            ctx.sell_all();
        }
    }
}

pub const DEFAULT_RSI_PERIOD: usize = 14;
pub const DEFAULT_RSI_LOWER: f64 = 30.0;
pub const DEFAULT_RSI_UPPER: f64 = 70.0;

/// Buys when RSI drops below `lower` while flat, sells everything when it
/// rises above `upper`.
pub struct RsiThreshold {
    period: usize,
    lower: f64,
    upper: f64,
    fraction: f64,
    rsi: RollingRsi,
}

impl RsiThreshold {
    pub fn new(period: usize, lower: f64, upper: f64) -> Self {
        Self {
            period,
            lower,
            upper,
            fraction: 1.0,
            rsi: RollingRsi::new(period),
        }
    }

    pub fn with_fraction(mut self, fraction: f64) -> Self {
        self.fraction = fraction;
        self
    }
}

impl Default for RsiThreshold {
    fn default() -> Self {
        Self::new(DEFAULT_RSI_PERIOD, DEFAULT_RSI_LOWER, DEFAULT_RSI_UPPER)
    }
}

impl Strategy for RsiThreshold {
    fn name(&self) -> &str {
        "rsi_threshold"
    }

    fn initialize(&mut self, _setup: &RunSetup) -> Result<(), String> {
        if self.period == 0 {
            return Err("rsi period must be positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.lower)
            || !(0.0..=100.0).contains(&self.upper)
            || self.lower >= self.upper
        {
            return Err(format!(
                "rsi thresholds must satisfy 0 <= lower ({}) < upper ({}) <= 100",
                self.lower, self.upper
            ));
        }
        check_fraction(self.fraction)?;
        self.rsi = RollingRsi::new(self.period);
        Ok(())
    }

    fn on_bar(&mut self, ctx: &mut BarContext<'_>) {
        let Some(rsi) = self.rsi.update(ctx.bar().close) else {
            return;
        };
        if rsi < self.lower && !ctx.has_position() {
            ctx.buy(OrderSize::PercentOfCash(self.fraction));
        } else if rsi > self.upper && ctx.has_position() {
            ctx.sell_all();
        }
    }
}

pub enum StrategyKind {
    Hold(HoldStrategy),
    BuyAndHold(BuyAndHold),
    SmaCrossover(SmaCrossover),
    RsiThreshold(RsiThreshold),
}

impl Strategy for StrategyKind {
    fn name(&self) -> &str {
        match self {
            StrategyKind::Hold(strategy) => strategy.name(),
            StrategyKind::BuyAndHold(strategy) => strategy.name(),
            StrategyKind::SmaCrossover(strategy) => strategy.name(),
            StrategyKind::RsiThreshold(strategy) => strategy.name(),
        }
    }

    fn initialize(&mut self, setup: &RunSetup) -> Result<(), String> {
        match self {
            StrategyKind::Hold(strategy) => strategy.initialize(setup),
            StrategyKind::BuyAndHold(strategy) => strategy.initialize(setup),
            StrategyKind::SmaCrossover(strategy) => strategy.initialize(setup),
            StrategyKind::RsiThreshold(strategy) => strategy.initialize(setup),
        }
    }

    fn on_bar(&mut self, ctx: &mut BarContext<'_>) {
        match self {
            StrategyKind::Hold(strategy) => strategy.on_bar(ctx),
            StrategyKind::BuyAndHold(strategy) => strategy.on_bar(ctx),
            StrategyKind::SmaCrossover(strategy) => strategy.on_bar(ctx),
            StrategyKind::RsiThreshold(strategy) => strategy.on_bar(ctx),
        }
    }
}
