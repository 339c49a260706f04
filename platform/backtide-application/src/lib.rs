pub mod backtesting;
pub mod config;
pub mod error;
pub mod experiments;
pub mod reporting;

pub use error::ApplicationError;
