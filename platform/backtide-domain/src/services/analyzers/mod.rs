pub mod performance;

pub use performance::{
    max_drawdown, period_returns, sample_std, AnalyzerInput, PerformanceAnalyzer,
    PerformanceMetrics,
};
