use crate::value_objects::side::Side;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An executed fill. `realized_pnl` is only set on sells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: NaiveDate,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
    pub realized_pnl: Option<f64>,
}

impl Trade {
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }

    /// Cash moved by the fill: negative for buys, positive for sells.
    pub fn cash_delta(&self) -> f64 {
        match self.side {
            Side::Buy => -(self.notional() + self.commission),
            Side::Sell => self.notional() - self.commission,
        }
    }
}
