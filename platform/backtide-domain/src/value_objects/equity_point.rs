use crate::entities::account::Account;
use crate::value_objects::bar::Bar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    pub position_qty: f64,
    pub close: f64,
    pub realized_pnl: f64,
}

impl EquityPoint {
    /// Marks the account at the bar's close.
    pub fn capture(bar: &Bar, account: &Account) -> Self {
        Self {
            timestamp: bar.timestamp,
            equity: account.mark_to_market(bar.close),
            cash: account.cash(),
            position_qty: account.position().quantity,
            close: bar.close,
            realized_pnl: account.realized_pnl(),
        }
    }

    pub fn position_value(&self) -> f64 {
        self.position_qty * self.close
    }
}
