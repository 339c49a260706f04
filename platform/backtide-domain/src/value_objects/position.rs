use serde::{Deserialize, Serialize};

/// Long-only holding. `avg_cost` excludes commissions and resets to zero when flat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub quantity: f64,
    pub avg_cost: f64,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.quantity <= 0.0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }
}
