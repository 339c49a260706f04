use crate::error::ApplicationError;
use crate::experiments::sweep::{SweepResult, SweepRunEntry};
use backtide_domain::engine::result::BacktestResult;
use backtide_domain::services::analyzers::PerformanceMetrics;
use backtide_domain::value_objects::equity_point::EquityPoint;
use backtide_domain::value_objects::order::OrderStats;
use backtide_domain::value_objects::trade::Trade;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct TradeRow<'a> {
    timestamp: NaiveDate,
    side: &'a str,
    quantity: f64,
    price: f64,
    commission: f64,
    realized_pnl: Option<f64>,
}

#[derive(Serialize)]
struct EquityRow {
    timestamp: NaiveDate,
    equity: f64,
    cash: f64,
    position_qty: f64,
    close: f64,
    realized_pnl: f64,
}

#[derive(Serialize)]
struct SummaryMeta<'a> {
    ticker: &'a str,
    strategy: &'a str,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    meta: SummaryMeta<'a>,
    metrics: &'a PerformanceMetrics,
    orders: OrderStats,
}

pub fn write_trades_csv<W: Write>(writer: W, trades: &[Trade]) -> Result<(), ApplicationError> {
    let mut wtr = csv::Writer::from_writer(writer);
    if trades.is_empty() {
        wtr.write_record([
            "timestamp",
            "side",
            "quantity",
            "price",
            "commission",
            "realized_pnl",
        ])?;
    }
    for trade in trades {
        wtr.serialize(TradeRow {
            timestamp: trade.timestamp,
            side: trade.side.as_str(),
            quantity: trade.quantity,
            price: trade.price,
            commission: trade.commission,
            realized_pnl: trade.realized_pnl,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_equity_csv<W: Write>(
    writer: W,
    points: &[EquityPoint],
) -> Result<(), ApplicationError> {
    let mut wtr = csv::Writer::from_writer(writer);
    if points.is_empty() {
        wtr.write_record([
            "timestamp",
            "equity",
            "cash",
            "position_qty",
            "close",
            "realized_pnl",
        ])?;
    }
    for point in points {
        wtr.serialize(EquityRow {
            timestamp: point.timestamp,
            equity: point.equity,
            cash: point.cash,
            position_qty: point.position_qty,
            close: point.close,
            realized_pnl: point.realized_pnl,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Pretty JSON with run metadata, every metric (`null` when undefined) and order counts.
pub fn write_summary_json<W: Write>(
    writer: W,
    result: &BacktestResult,
) -> Result<(), ApplicationError> {
    let doc = SummaryDocument {
        meta: SummaryMeta {
            ticker: result.ticker(),
            strategy: result.strategy(),
            start_date: result.start_date(),
            end_date: result.end_date(),
        },
        metrics: result.metrics(),
        orders: result.orders(),
    };
    serde_json::to_writer_pretty(writer, &doc)?;
    Ok(())
}

const SWEEP_HEADER: [&str; 10] = [
    "run_id",
    "status",
    "bars_processed",
    "total_trades",
    "total_return",
    "cagr",
    "sharpe_ratio",
    "max_drawdown",
    "win_rate",
    "error",
];

/// One row per run, in the order given. Undefined metrics are empty cells.
pub fn write_sweep_csv<W: Write>(writer: W, result: &SweepResult) -> Result<(), ApplicationError> {
    write_run_rows(writer, result.runs.iter(), false)
}

/// Ranked rows as produced by [`crate::experiments::sweep::leaderboard`].
pub fn write_leaderboard_csv<'a, W: Write>(
    writer: W,
    rows: &[&'a SweepRunEntry],
) -> Result<(), ApplicationError> {
    write_run_rows(writer, rows.iter().copied(), true)
}

fn write_run_rows<'a, W: Write>(
    writer: W,
    runs: impl Iterator<Item = &'a SweepRunEntry>,
    ranked: bool,
) -> Result<(), ApplicationError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header: Vec<&str> = Vec::with_capacity(SWEEP_HEADER.len() + 1);
    if ranked {
        header.push("rank");
    }
    header.extend(SWEEP_HEADER);
    wtr.write_record(&header)?;

    for (idx, r) in runs.enumerate() {
        let m = r.metrics.as_ref();
        let cell = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        if ranked {
            record.push((idx + 1).to_string());
        }
        record.extend([
            r.run_id.clone(),
            r.status.as_str().to_string(),
            m.map(|m| m.bars_processed.to_string()).unwrap_or_default(),
            m.map(|m| m.total_trades.to_string()).unwrap_or_default(),
            cell(m.map(|m| m.total_return)),
            cell(m.and_then(|m| m.cagr)),
            cell(m.and_then(|m| m.sharpe_ratio)),
            cell(m.map(|m| m.max_drawdown)),
            cell(m.and_then(|m| m.win_rate)),
            r.error.clone().unwrap_or_default(),
        ]);
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
