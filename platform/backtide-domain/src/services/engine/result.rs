use crate::services::analyzers::PerformanceMetrics;
use crate::services::engine::config::BacktestConfig;
use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::order::OrderStats;
use crate::value_objects::trade::Trade;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::{self, Write as _};

/// Outcome of a completed run. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    ticker: String,
    strategy: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    config: BacktestConfig,
    metrics: PerformanceMetrics,
    equity_curve: Vec<EquityPoint>,
    trades: Vec<Trade>,
    orders: OrderStats,
}

impl BacktestResult {
    pub(crate) fn new(
        config: BacktestConfig,
        strategy: String,
        metrics: PerformanceMetrics,
        equity_curve: Vec<EquityPoint>,
        trades: Vec<Trade>,
        orders: OrderStats,
    ) -> Self {
        Self {
            ticker: config.ticker.clone(),
            strategy,
            start_date: config.start_date,
            end_date: config.end_date,
            config,
            metrics,
            equity_curve,
            trades,
            orders,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn orders(&self) -> OrderStats {
        self.orders
    }

    /// Multi-line report. Undefined ratios print as `n/a`.
    pub fn summary(&self) -> String {
        let m = &self.metrics;
        let rule = "=".repeat(52);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Backtest: {} / {}", self.ticker, self.strategy);
        let _ = writeln!(out, "Period:   {} .. {}", self.start_date, self.end_date);
        let _ = writeln!(out, "{rule}");
        let rows: [(&str, String); 18] = [
            ("Initial capital", money(m.initial_capital)),
            ("Final equity", money(m.final_equity)),
            ("Total P&L (realized)", money(m.total_pnl)),
            ("Total return", pct(m.total_return)),
            ("CAGR", opt(m.cagr, pct)),
            ("Volatility (ann.)", pct(m.volatility)),
            ("Sharpe ratio", opt(m.sharpe_ratio, ratio)),
            ("Max drawdown", pct(m.max_drawdown)),
            ("Win rate", opt(m.win_rate, pct)),
            ("Total trades", m.total_trades.to_string()),
            ("Closed trades", m.closed_trades.to_string()),
            ("Winning trades", m.winning_trades.to_string()),
            ("Losing trades", m.losing_trades.to_string()),
            ("Average win", opt(m.avg_win, money)),
            ("Average loss", opt(m.avg_loss, money)),
            ("Profit factor", opt(m.profit_factor, ratio)),
            ("Bars processed", m.bars_processed.to_string()),
            (
                "Orders (fill/clamp/reject)",
                format!(
                    "{}/{}/{}",
                    self.orders.filled, self.orders.clamped, self.orders.rejected
                ),
            ),
        ];
        for (label, value) in rows {
            let _ = writeln!(out, "{label:<28}{value:>24}");
        }
        let _ = write!(out, "{rule}");
        out
    }
}

impl fmt::Display for BacktestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}..{}: return {} max_dd {} sharpe {} trades {}",
            self.ticker,
            self.strategy,
            self.start_date,
            self.end_date,
            pct(self.metrics.total_return),
            pct(self.metrics.max_drawdown),
            opt(self.metrics.sharpe_ratio, ratio),
            self.metrics.total_trades
        )
    }
}

fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn ratio(value: f64) -> String {
    format!("{value:.3}")
}

fn opt(value: Option<f64>, render: fn(f64) -> String) -> String {
    value.map(render).unwrap_or_else(|| "n/a".to_string())
}
