pub mod bar;
pub mod equity_point;
pub mod order;
pub mod position;
pub mod side;
pub mod timeframe;
pub mod trade;
