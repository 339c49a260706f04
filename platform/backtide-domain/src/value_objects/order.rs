use crate::value_objects::trade::Trade;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a strategy sizes a trading request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OrderSize {
    Quantity(f64),
    /// Fraction of available cash in `[0, 1]`; buys only.
    PercentOfCash(f64),
    /// Fraction of the held quantity in `[0, 1]`; sells only.
    PercentOfPosition(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    InsufficientCash { required: f64, available: f64 },
    NoPosition,
    OversizedSell { requested: f64, held: f64 },
    InvalidQuantity { quantity: f64 },
    InvalidPercent { percent: f64 },
    InvalidPrice { price: f64 },
    UnsupportedSize,
    ZeroQuantityAfterRounding { requested: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InsufficientCash {
                required,
                available,
            } => write!(f, "insufficient cash: required {required}, available {available}"),
            RejectReason::NoPosition => write!(f, "no position to sell"),
            RejectReason::OversizedSell { requested, held } => {
                write!(f, "sell of {requested} exceeds held quantity {held}")
            }
            RejectReason::InvalidQuantity { quantity } => write!(f, "invalid quantity {quantity}"),
            RejectReason::InvalidPercent { percent } => {
                write!(f, "percent {percent} outside [0, 1]")
            }
            RejectReason::InvalidPrice { price } => write!(f, "invalid price {price}"),
            RejectReason::UnsupportedSize => write!(f, "order size not valid for this side"),
            RejectReason::ZeroQuantityAfterRounding { requested } => {
                write!(f, "requested quantity {requested} rounds to zero")
            }
        }
    }
}

/// Synchronous resolution of a trading request against the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled(Trade),
    /// Filled for less than requested (oversized sell clamp or affordable-only buy).
    Clamped { trade: Trade, requested: f64 },
    /// No effect on cash, position or the trade log.
    Rejected(RejectReason),
}

impl OrderOutcome {
    pub fn trade(&self) -> Option<&Trade> {
        match self {
            OrderOutcome::Filled(trade) | OrderOutcome::Clamped { trade, .. } => Some(trade),
            OrderOutcome::Rejected(_) => None,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.trade().is_some()
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, OrderOutcome::Rejected(_))
    }
}

/// Per-run counters of order outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub filled: usize,
    pub clamped: usize,
    pub rejected: usize,
}

impl OrderStats {
    pub fn record(&mut self, outcome: &OrderOutcome) {
        match outcome {
            OrderOutcome::Filled(_) => self.filled += 1,
            OrderOutcome::Clamped { .. } => self.clamped += 1,
            OrderOutcome::Rejected(_) => self.rejected += 1,
        }
    }
}
