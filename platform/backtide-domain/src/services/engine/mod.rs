pub mod backtest;
pub mod config;
pub mod execution;
pub mod result;
