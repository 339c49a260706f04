use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::side::Side;
use crate::value_objects::trade::Trade;
use serde::{Deserialize, Serialize};

const DAYS_PER_YEAR: f64 = 365.25;
const STD_EPSILON: f64 = 1e-12;

pub struct AnalyzerInput<'a> {
    pub equity: &'a [EquityPoint],
    pub trades: &'a [Trade],
    pub initial_capital: f64,
}

/// Summary statistics for one run. Ratios with no meaningful value are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub cagr: Option<f64>,
    pub volatility: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
    pub win_rate: Option<f64>,
    pub total_trades: usize,
    pub closed_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_win: Option<f64>,
    pub avg_loss: Option<f64>,
    pub profit_factor: Option<f64>,
    pub total_pnl: f64,
    pub bars_processed: usize,
    pub periods_per_year: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceAnalyzer {
    /// Annual rate.
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl PerformanceAnalyzer {
    pub fn new(risk_free_rate: f64, periods_per_year: f64) -> Self {
        Self {
            risk_free_rate,
            periods_per_year,
        }
    }

    pub fn analyze(&self, input: &AnalyzerInput<'_>) -> PerformanceMetrics {
        let initial_capital = input.initial_capital;
        let final_equity = input
            .equity
            .last()
            .map(|point| point.equity)
            .unwrap_or(initial_capital);
        let total_return = if initial_capital > 0.0 {
            final_equity / initial_capital - 1.0
        } else {
            0.0
        };

        let returns = period_returns(input.equity);
        let std = sample_std(&returns);
        let scale = self.periods_per_year.sqrt();
        let volatility = std.map(|s| s * scale).unwrap_or(0.0);
        let sharpe_ratio = std.filter(|s| *s > STD_EPSILON).map(|s| {
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            let rf = self.risk_free_rate / self.periods_per_year;
            (mean - rf) / s * scale
        });

        let trades = TradeTally::from_trades(input.trades);

        PerformanceMetrics {
            initial_capital,
            final_equity,
            total_return,
            cagr: cagr(input.equity, initial_capital),
            volatility,
            sharpe_ratio,
            max_drawdown: max_drawdown(input.equity),
            win_rate: trades.win_rate(),
            total_trades: input.trades.len(),
            closed_trades: trades.closed,
            winning_trades: trades.wins,
            losing_trades: trades.losses,
            avg_win: trades.avg_win(),
            avg_loss: trades.avg_loss(),
            profit_factor: trades.profit_factor(),
            total_pnl: trades.total_pnl,
            bars_processed: input.equity.len(),
            periods_per_year: self.periods_per_year,
        }
    }
}

/// `r[i] = equity[i] / equity[i - 1] - 1`. Pairs with a non-positive base are skipped.
pub fn period_returns(equity: &[EquityPoint]) -> Vec<f64> {
    equity
        .windows(2)
        .filter(|pair| pair[0].equity > 0.0)
        .map(|pair| pair[1].equity / pair[0].equity - 1.0)
        .collect()
}

/// Sample standard deviation (n - 1), `None` with fewer than two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values
        .iter()
        .map(|value| {
            let diff = value - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1.0);
    Some(var.sqrt())
}

/// Deepest fall from a running peak, as a non-positive fraction.
pub fn max_drawdown(equity: &[EquityPoint]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for point in equity {
        if point.equity > peak {
            peak = point.equity;
        }
        if peak > 0.0 {
            worst = worst.min(point.equity / peak - 1.0);
        }
    }
    worst
}

/// Annualized growth over the calendar span of the curve. Spans shorter than a
/// year are extrapolated, so a one-day move compounds over 365.25 days.
fn cagr(equity: &[EquityPoint], initial_capital: f64) -> Option<f64> {
    let (first, last) = match equity {
        [first, .., last] => (first, last),
        _ => return None,
    };
    let days = (last.timestamp - first.timestamp).num_days();
    if days <= 0 || last.equity <= 0.0 || initial_capital <= 0.0 {
        return None;
    }
    let years = days as f64 / DAYS_PER_YEAR;
    Some((last.equity / initial_capital).powf(1.0 / years) - 1.0)
}

#[derive(Debug, Default)]
struct TradeTally {
    closed: usize,
    wins: usize,
    losses: usize,
    gross_win: f64,
    gross_loss: f64,
    total_pnl: f64,
}

impl TradeTally {
    fn from_trades(trades: &[Trade]) -> Self {
        let mut tally = Self::default();
        for trade in trades.iter().filter(|t| t.side == Side::Sell) {
            let pnl = trade.realized_pnl.unwrap_or(0.0);
            tally.closed += 1;
            tally.total_pnl += pnl;
            if pnl > 0.0 {
                tally.wins += 1;
                tally.gross_win += pnl;
            } else if pnl < 0.0 {
                tally.losses += 1;
                tally.gross_loss -= pnl;
            }
        }
        tally
    }

    fn win_rate(&self) -> Option<f64> {
        (self.closed > 0).then(|| self.wins as f64 / self.closed as f64)
    }

    fn avg_win(&self) -> Option<f64> {
        (self.wins > 0).then(|| self.gross_win / self.wins as f64)
    }

    fn avg_loss(&self) -> Option<f64> {
        (self.losses > 0).then(|| self.gross_loss / self.losses as f64)
    }

    fn profit_factor(&self) -> Option<f64> {
        (self.gross_loss > 0.0).then(|| self.gross_win / self.gross_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::{max_drawdown, period_returns, sample_std, AnalyzerInput, PerformanceAnalyzer};
    use crate::value_objects::equity_point::EquityPoint;
    use crate::value_objects::side::Side;
    use crate::value_objects::trade::Trade;
    use chrono::{Duration, NaiveDate};

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, equity)| EquityPoint {
                timestamp: start + Duration::days(i as i64),
                equity: *equity,
                cash: *equity,
                position_qty: 0.0,
                close: 1.0,
                realized_pnl: 0.0,
            })
            .collect()
    }

    fn sell(pnl: f64) -> Trade {
        Trade {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            side: Side::Sell,
            quantity: 1.0,
            price: 1.0,
            commission: 0.0,
            realized_pnl: Some(pnl),
        }
    }

    #[test]
    fn drawdown_measures_peak_to_trough() {
        let equity = curve(&[100.0, 110.0, 90.0, 120.0]);
        let dd = max_drawdown(&equity);
        assert!((dd - (90.0 / 110.0 - 1.0)).abs() < 1e-12);
        assert_eq!(max_drawdown(&curve(&[1.0, 2.0, 3.0])), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn returns_and_sample_std() {
        let returns = period_returns(&curve(&[100.0, 110.0, 99.0]));
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.1).abs() < 1e-12);
        assert!((returns[1] + 0.1).abs() < 1e-12);
        let std = sample_std(&returns).unwrap();
        assert!((std - (0.02f64).sqrt()).abs() < 1e-12);
        assert_eq!(sample_std(&[0.5]), None);
    }

    #[test]
    fn flat_curve_has_no_sharpe_and_zero_volatility() {
        let equity = curve(&[100.0, 100.0, 100.0]);
        let metrics = PerformanceAnalyzer::new(0.0, 252.0).analyze(&AnalyzerInput {
            equity: &equity,
            trades: &[],
            initial_capital: 100.0,
        });
        assert_eq!(metrics.total_return, 0.0);
        assert_eq!(metrics.sharpe_ratio, None);
        assert_eq!(metrics.volatility, 0.0);
        assert_eq!(metrics.win_rate, None);
        assert_eq!(metrics.profit_factor, None);
        assert_eq!(metrics.cagr, Some(0.0));
    }

    #[test]
    fn single_point_is_degenerate_but_defined() {
        let equity = curve(&[100.0]);
        let metrics = PerformanceAnalyzer::new(0.02, 252.0).analyze(&AnalyzerInput {
            equity: &equity,
            trades: &[],
            initial_capital: 100.0,
        });
        assert_eq!(metrics.cagr, None);
        assert_eq!(metrics.sharpe_ratio, None);
        assert_eq!(metrics.bars_processed, 1);
    }

    #[test]
    fn trade_statistics_over_sells() {
        let trades = vec![sell(10.0), sell(-4.0), sell(6.0)];
        let equity = curve(&[100.0, 112.0]);
        let metrics = PerformanceAnalyzer::new(0.0, 252.0).analyze(&AnalyzerInput {
            equity: &equity,
            trades: &trades,
            initial_capital: 100.0,
        });
        assert!((metrics.win_rate.unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 1);
        assert_eq!(metrics.avg_win, Some(8.0));
        assert_eq!(metrics.avg_loss, Some(4.0));
        assert_eq!(metrics.profit_factor, Some(4.0));
        assert!((metrics.total_pnl - 12.0).abs() < 1e-12);
    }

    #[test]
    fn cagr_extrapolates_short_spans() {
        let equity = curve(&[100.0, 101.0]);
        let metrics = PerformanceAnalyzer::new(0.0, 252.0).analyze(&AnalyzerInput {
            equity: &equity,
            trades: &[],
            initial_capital: 100.0,
        });
        let expected = 1.01f64.powf(365.25) - 1.0;
        assert!((metrics.cagr.unwrap() - expected).abs() < 1e-9 * expected);
        assert!(metrics.cagr.unwrap() > 30.0);
    }

    #[test]
    fn cagr_over_one_calendar_year() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let mut equity = curve(&[100.0, 121.0]);
        equity[0].timestamp = start;
        equity[1].timestamp = start + Duration::days(365);
        let metrics = PerformanceAnalyzer::new(0.0, 1.0).analyze(&AnalyzerInput {
            equity: &equity,
            trades: &[],
            initial_capital: 100.0,
        });
        let years = 365.0 / 365.25;
        let expected = 1.21f64.powf(1.0 / years) - 1.0;
        assert!((metrics.cagr.unwrap() - expected).abs() < 1e-12);
    }
}
