use crate::backtesting;
use crate::config::Config;
use crate::error::ApplicationError;
use backtide_domain::repositories::market_data::{BarQuery, MarketDataRepository};
use backtide_domain::services::analyzers::PerformanceMetrics;
use backtide_domain::value_objects::bar::Bar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Instant;
use tracing::{info, info_span};

const FORBIDDEN_PATHS: [&str; 2] = ["run.ticker", "run.run_id"];

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepFile {
    pub base: SweepBase,
    pub sweep: SweepMeta,
    #[serde(default)]
    pub params: Vec<SweepParam>,
    pub leaderboard: Option<LeaderboardConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepBase {
    /// Path to the base run config, relative to the sweep file.
    pub config: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepMeta {
    pub id: String,
    pub parallelism: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepParam {
    pub path: String,
    pub values: Vec<toml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeaderboardConfig {
    pub sort_by: Option<String>,
    pub descending: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepRunEntry {
    pub run_id: String,
    pub params: BTreeMap<String, toml::Value>,
    pub status: RunStatus,
    pub error: Option<String>,
    pub metrics: Option<PerformanceMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub sweep_id: String,
    pub runs: Vec<SweepRunEntry>,
}

struct SweepRunPlan {
    order_idx: usize,
    run_id: String,
    params: BTreeMap<String, toml::Value>,
    config: Result<Config, String>,
}

/// Reads a sweep file and its base config from disk, then runs every grid point.
pub fn run_sweep(
    sweep_path: &Path,
    market_data: &dyn MarketDataRepository,
) -> Result<SweepResult, ApplicationError> {
    let raw = std::fs::read_to_string(sweep_path).map_err(|err| {
        ApplicationError::Sweep(format!(
            "failed to read sweep config {}: {err}",
            sweep_path.display()
        ))
    })?;
    let sweep = parse_sweep(&raw)?;
    let base_path = resolve_base_config_path(sweep_path, &sweep.base.config);
    let (_base, base_toml) = crate::config::load_config_with_source(&base_path)?;
    run_sweep_with_base(&sweep, &base_toml, market_data)
}

pub fn parse_sweep(raw: &str) -> Result<SweepFile, ApplicationError> {
    toml::from_str(raw)
        .map_err(|err| ApplicationError::Sweep(format!("failed to parse sweep TOML: {err}")))
}

/// Expands the grid over `base_toml`, loads bars once for the widest date range
/// any run needs, and executes runs on a scoped worker pool.
///
/// Entries come back in grid order. A run whose config or validation fails is
/// recorded with [`RunStatus::Error`] instead of aborting the sweep.
pub fn run_sweep_with_base(
    sweep: &SweepFile,
    base_toml: &str,
    market_data: &dyn MarketDataRepository,
) -> Result<SweepResult, ApplicationError> {
    let _span = info_span!("run_sweep", sweep_id = %sweep.sweep.id).entered();
    let stage_start = Instant::now();

    validate_param_paths(&sweep.params)?;
    let base_config = crate::config::load_config_from_str(base_toml)?;
    let base_value: toml::Value = toml::from_str(base_toml).map_err(|err| {
        ApplicationError::Sweep(format!("failed to parse base config TOML as value: {err}"))
    })?;

    let grid = expand_grid(&sweep.params);
    let mut plans = Vec::with_capacity(grid.len());
    for (order_idx, assignment) in grid.into_iter().enumerate() {
        let mut value = base_value.clone();
        apply_assignment(&mut value, &assignment)?;
        let run_id = format!("{}__{}", sweep.sweep.id, assignment_hash(&assignment));
        set_path_value(&mut value, "run.run_id", toml::Value::String(run_id.clone()))?;
        let config = toml::to_string(&value)
            .map_err(|err| err.to_string())
            .and_then(|raw| toml::from_str::<Config>(&raw).map_err(|err| err.to_string()));
        plans.push(SweepRunPlan {
            order_idx,
            run_id,
            params: assignment,
            config,
        });
    }

    let bars = load_sweep_bars(&base_config, &plans, market_data)?;
    let parallelism = normalize_parallelism(sweep.sweep.parallelism);
    let mut executed: Vec<(usize, SweepRunEntry)> = if parallelism <= 1 || plans.len() <= 1 {
        plans
            .iter()
            .map(|plan| (plan.order_idx, execute_run_plan(plan, &bars)))
            .collect()
    } else {
        execute_plans_parallel(&plans, parallelism, &bars)
    };
    executed.sort_by_key(|(order_idx, _)| *order_idx);
    let runs: Vec<SweepRunEntry> = executed.into_iter().map(|(_, entry)| entry).collect();

    let errors = runs.iter().filter(|r| r.status == RunStatus::Error).count();
    metrics::counter!("backtide.sweep.runs").increment(runs.len() as u64);
    metrics::histogram!("backtide.sweep.total_ms")
        .record(stage_start.elapsed().as_millis() as f64);
    info!(runs = runs.len(), errors, "sweep complete");

    Ok(SweepResult {
        sweep_id: sweep.sweep.id.clone(),
        runs,
    })
}

/// Completed runs ranked by `sort_by` (default `sharpe_ratio`, descending).
/// Runs without a value for the metric rank last.
pub fn leaderboard<'a>(
    result: &'a SweepResult,
    cfg: Option<&LeaderboardConfig>,
) -> Vec<&'a SweepRunEntry> {
    let sort_by = cfg
        .and_then(|c| c.sort_by.as_deref())
        .unwrap_or("sharpe_ratio")
        .trim()
        .to_lowercase();
    let descending = cfg.and_then(|c| c.descending).unwrap_or(true);

    let mut rows: Vec<(&SweepRunEntry, Option<f64>)> = result
        .runs
        .iter()
        .filter_map(|r| match (&r.status, &r.metrics) {
            (RunStatus::Ok, Some(m)) => Some((r, metric_value(m, &sort_by))),
            _ => None,
        })
        .collect();
    rows.sort_by(|(_, a), (_, b)| match (a, b) {
        (Some(a), Some(b)) => {
            let ord = a.partial_cmp(b).unwrap_or(CmpOrdering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    });
    rows.into_iter().map(|(r, _)| r).collect()
}

pub fn metric_value(m: &PerformanceMetrics, key: &str) -> Option<f64> {
    match key {
        "total_return" => Some(m.total_return),
        "cagr" => m.cagr,
        "volatility" => Some(m.volatility),
        "max_drawdown" | "max_dd" => Some(m.max_drawdown),
        "win_rate" => m.win_rate,
        "profit_factor" => m.profit_factor,
        "total_pnl" => Some(m.total_pnl),
        "final_equity" => Some(m.final_equity),
        "total_trades" | "trades" => Some(m.total_trades as f64),
        _ => m.sharpe_ratio,
    }
}

fn load_sweep_bars(
    base: &Config,
    plans: &[SweepRunPlan],
    market_data: &dyn MarketDataRepository,
) -> Result<Vec<Bar>, ApplicationError> {
    let base_engine = base.to_backtest_config()?;
    let (mut start, mut end) = (base_engine.start_date, base_engine.end_date);
    for plan in plans {
        let Ok(config) = &plan.config else { continue };
        if let Ok(engine) = config.to_backtest_config() {
            start = start.min(engine.start_date);
            end = end.max(engine.end_date);
        }
    }
    let ticker = backtide_domain::engine::config::normalize_ticker(&base_engine.ticker)
        .map_err(|err| ApplicationError::Sweep(err.to_string()))?;
    market_data
        .load_bars(&BarQuery { ticker, start, end })
        .map_err(ApplicationError::MarketData)
}

fn normalize_parallelism(value: Option<usize>) -> usize {
    value.unwrap_or(1).max(1)
}

fn execute_plans_parallel(
    plans: &[SweepRunPlan],
    parallelism: usize,
    bars: &[Bar],
) -> Vec<(usize, SweepRunEntry)> {
    let worker_count = parallelism.max(1).min(plans.len());
    let next_index = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, SweepRunEntry)>();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let tx = tx.clone();
            let next_index_ref = &next_index;
            scope.spawn(move || loop {
                let plan_idx = next_index_ref.fetch_add(1, Ordering::Relaxed);
                let Some(plan) = plans.get(plan_idx) else {
                    break;
                };
                let entry = execute_run_plan(plan, bars);
                if tx.send((plan.order_idx, entry)).is_err() {
                    break;
                }
            });
        }
        drop(tx);
        rx.iter().collect()
    })
}

fn execute_run_plan(plan: &SweepRunPlan, bars: &[Bar]) -> SweepRunEntry {
    let outcome = match &plan.config {
        Ok(config) => backtesting::execute(config, bars).map_err(|err| err.to_string()),
        Err(err) => Err(format!("invalid generated config: {err}")),
    };
    match outcome {
        Ok(result) => SweepRunEntry {
            run_id: plan.run_id.clone(),
            params: plan.params.clone(),
            status: RunStatus::Ok,
            error: None,
            metrics: Some(result.metrics().clone()),
        },
        Err(err) => SweepRunEntry {
            run_id: plan.run_id.clone(),
            params: plan.params.clone(),
            status: RunStatus::Error,
            error: Some(err),
            metrics: None,
        },
    }
}

fn resolve_base_config_path(sweep_path: &Path, base: &str) -> PathBuf {
    let p = PathBuf::from(base);
    if p.is_absolute() {
        p
    } else {
        sweep_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(p)
    }
}

fn validate_param_paths(params: &[SweepParam]) -> Result<(), ApplicationError> {
    for p in params {
        let path = p.path.trim();
        if path.is_empty() {
            return Err(ApplicationError::Sweep(
                "sweep param path cannot be empty".to_string(),
            ));
        }
        if FORBIDDEN_PATHS.iter().any(|forbidden| path == *forbidden) {
            return Err(ApplicationError::Sweep(format!(
                "sweep param path not allowed: {}",
                p.path
            )));
        }
        if p.values.is_empty() {
            return Err(ApplicationError::Sweep(format!(
                "sweep param has no values: {}",
                p.path
            )));
        }
    }
    Ok(())
}

fn expand_grid(params: &[SweepParam]) -> Vec<BTreeMap<String, toml::Value>> {
    let mut out: Vec<BTreeMap<String, toml::Value>> = vec![BTreeMap::new()];
    for p in params {
        let mut next = Vec::with_capacity(out.len() * p.values.len());
        for base in &out {
            for v in &p.values {
                let mut m = base.clone();
                m.insert(p.path.trim().to_string(), v.clone());
                next.push(m);
            }
        }
        out = next;
    }
    out
}

/// First 12 hex chars of the SHA-256 of the assignment's canonical JSON.
pub fn assignment_hash(assignment: &BTreeMap<String, toml::Value>) -> String {
    let canonical = serde_json::to_string(assignment)
        .unwrap_or_else(|_| "{\"error\":\"assignment\"}".to_string());
    let digest = Sha256::digest(canonical.as_bytes());
    digest
        .iter()
        .flat_map(|b| [b >> 4, b & 0x0f])
        .take(12)
        .map(|nibble| char::from_digit(u32::from(nibble), 16).unwrap_or('0'))
        .collect()
}

fn apply_assignment(
    root: &mut toml::Value,
    assignment: &BTreeMap<String, toml::Value>,
) -> Result<(), ApplicationError> {
    for (path, value) in assignment {
        set_path_value(root, path, value.clone())?;
    }
    Ok(())
}

/// Replaces an existing value at a dotted path. Missing keys are errors.
fn set_path_value(
    root: &mut toml::Value,
    path: &str,
    value: toml::Value,
) -> Result<(), ApplicationError> {
    let parts: Vec<&str> = path
        .split('.')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    let Some((last, parents)) = parts.split_last() else {
        return Err(ApplicationError::Sweep("empty path".to_string()));
    };
    let mut cur = root;
    for key in parents {
        cur = cur
            .get_mut(*key)
            .ok_or_else(|| ApplicationError::Sweep(format!("path not found: {path}")))?;
    }
    let table = cur
        .as_table_mut()
        .ok_or_else(|| ApplicationError::Sweep(format!("path is not a table: {path}")))?;
    if !table.contains_key(*last) {
        return Err(ApplicationError::Sweep(format!("path not found: {path}")));
    }
    table.insert((*last).to_string(), value);
    Ok(())
}
