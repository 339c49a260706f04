use serde::{Deserialize, Serialize};

/// Slack added before flooring to whole units.
const WHOLE_UNIT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareRounding {
    /// Quantities are floored to whole units.
    #[default]
    Whole,
    Fractional,
}

impl ShareRounding {
    pub fn apply(&self, quantity: f64) -> f64 {
        match self {
            ShareRounding::Whole => (quantity + WHOLE_UNIT_EPSILON).floor(),
            ShareRounding::Fractional => quantity,
        }
    }
}

/// What happens to a buy whose cost plus commission exceeds available cash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashShortfall {
    #[default]
    Reject,
    FillAffordable,
}

/// What happens to a sell larger than the held quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizedSell {
    #[default]
    Clamp,
    Reject,
}

/// Order routing rules. Every request still fills at the current bar's close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    pub share_rounding: ShareRounding,
    pub cash_shortfall: CashShortfall,
    pub oversized_sell: OversizedSell,
    /// Sell any open position on the final bar, after the strategy hook and
    /// before that bar's equity point is recorded.
    pub liquidate_at_end: bool,
}

impl ExecutionPolicy {
    /// Largest quantity whose cost plus commission fits in `cash`.
    pub fn affordable_quantity(&self, cash: f64, price: f64, commission_rate: f64) -> f64 {
        if cash <= 0.0 || price <= 0.0 {
            return 0.0;
        }
        let unit_cost = price * (1.0 + commission_rate);
        let mut quantity = self.share_rounding.apply(cash / unit_cost);
        if self.share_rounding == ShareRounding::Whole {
            while quantity > 0.0 && quantity * unit_cost > cash {
                quantity -= 1.0;
            }
        }
        quantity.max(0.0)
    }
}
