pub mod rolling;

pub use rolling::{sma, RollingRsi};
