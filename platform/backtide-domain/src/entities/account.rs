use crate::value_objects::order::{OrderOutcome, RejectReason};
use crate::value_objects::position::Position;
use crate::value_objects::side::Side;
use crate::value_objects::trade::Trade;
use chrono::NaiveDate;

/// Relative slack when comparing a buy's total cost with available cash.
const CASH_TOLERANCE: f64 = 1e-9;

/// Cash, the single long position, and the append-only trade log for one run.
///
/// This is the only place cash and position change. Running balances are
/// never rounded.
#[derive(Debug, Clone)]
pub struct Account {
    initial_cash: f64,
    cash: f64,
    position: Position,
    realized_pnl: f64,
    trades: Vec<Trade>,
}

impl Account {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            position: Position::default(),
            realized_pnl: 0.0,
            trades: Vec::new(),
        }
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    pub fn mark_to_market(&self, price: f64) -> f64 {
        self.cash + self.position.market_value(price)
    }

    /// Largest amount of cash a buy may consume, including float slack.
    pub fn spendable_cash(&self) -> f64 {
        self.cash + CASH_TOLERANCE * self.cash.abs().max(1.0)
    }

    pub fn apply_buy(
        &mut self,
        timestamp: NaiveDate,
        quantity: f64,
        price: f64,
        commission_rate: f64,
    ) -> OrderOutcome {
        if let Some(reason) = check_inputs(quantity, price) {
            return OrderOutcome::Rejected(reason);
        }

        let cost = quantity * price;
        let commission = cost * commission_rate;
        let required = cost + commission;
        if required > self.spendable_cash() {
            return OrderOutcome::Rejected(RejectReason::InsufficientCash {
                required,
                available: self.cash,
            });
        }

        self.cash = (self.cash - required).max(0.0);

        let total_qty = self.position.quantity + quantity;
        let weighted_cost = self.position.avg_cost * self.position.quantity + cost;
        self.position.avg_cost = weighted_cost / total_qty;
        self.position.quantity = total_qty;

        let trade = Trade {
            timestamp,
            side: Side::Buy,
            quantity,
            price,
            commission,
            realized_pnl: None,
        };
        self.trades.push(trade.clone());
        OrderOutcome::Filled(trade)
    }

    /// Sells up to the held quantity. Oversized requests are rejected here;
    /// clamping is an order-routing decision made by the caller.
    pub fn apply_sell(
        &mut self,
        timestamp: NaiveDate,
        quantity: f64,
        price: f64,
        commission_rate: f64,
    ) -> OrderOutcome {
        if let Some(reason) = check_inputs(quantity, price) {
            return OrderOutcome::Rejected(reason);
        }
        if self.position.is_flat() {
            return OrderOutcome::Rejected(RejectReason::NoPosition);
        }
        if quantity > self.position.quantity {
            return OrderOutcome::Rejected(RejectReason::OversizedSell {
                requested: quantity,
                held: self.position.quantity,
            });
        }

        let proceeds = quantity * price;
        let commission = proceeds * commission_rate;
        let pnl = (price - self.position.avg_cost) * quantity - commission;

        self.cash += proceeds - commission;
        self.realized_pnl += pnl;
        self.position.quantity -= quantity;
        if self.position.quantity <= 0.0 {
            self.position = Position::default();
        }

        let trade = Trade {
            timestamp,
            side: Side::Sell,
            quantity,
            price,
            commission,
            realized_pnl: Some(pnl),
        };
        self.trades.push(trade.clone());
        OrderOutcome::Filled(trade)
    }
}

fn check_inputs(quantity: f64, price: f64) -> Option<RejectReason> {
    if !price.is_finite() || price <= 0.0 {
        return Some(RejectReason::InvalidPrice { price });
    }
    if !quantity.is_finite() || quantity <= 0.0 {
        return Some(RejectReason::InvalidQuantity { quantity });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::Account;
    use crate::value_objects::order::{OrderOutcome, RejectReason};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).expect("valid date")
    }

    #[test]
    fn buy_and_sell_updates_cash_and_position() {
        let mut account = Account::new(1000.0);
        let bought = account.apply_buy(day(1), 1.0, 100.0, 0.01);
        assert!(bought.is_filled());
        assert_eq!(account.position().quantity, 1.0);
        assert!((account.cash() - 899.0).abs() < 1e-9);

        let sold = account.apply_sell(day(2), 1.0, 110.0, 0.01);
        let trade = sold.trade().expect("sell filled");
        assert!((trade.realized_pnl.unwrap() - 8.9).abs() < 1e-9);
        assert_eq!(account.position().quantity, 0.0);
        assert_eq!(account.position().avg_cost, 0.0);
        assert!((account.cash() - 1007.9).abs() < 1e-9);
        assert_eq!(account.trades().len(), 2);
    }

    #[test]
    fn weighted_average_cost_across_buys() {
        let mut account = Account::new(10_000.0);
        account.apply_buy(day(1), 10.0, 100.0, 0.0);
        account.apply_buy(day(2), 30.0, 120.0, 0.0);
        assert_eq!(account.position().quantity, 40.0);
        assert!((account.position().avg_cost - 115.0).abs() < 1e-9);
    }

    #[test]
    fn insufficient_cash_leaves_state_untouched() {
        let mut account = Account::new(500.0);
        let outcome = account.apply_buy(day(1), 10.0, 100.0, 0.0);
        assert!(matches!(
            outcome,
            OrderOutcome::Rejected(RejectReason::InsufficientCash { .. })
        ));
        assert_eq!(account.cash(), 500.0);
        assert!(account.position().is_flat());
        assert!(account.trades().is_empty());
    }

    #[test]
    fn commission_counts_toward_required_cash() {
        let mut account = Account::new(1000.0);
        let outcome = account.apply_buy(day(1), 10.0, 100.0, 0.001);
        assert!(outcome.is_rejected());
        assert_eq!(account.cash(), 1000.0);
    }

    #[test]
    fn partial_sell_keeps_cost_basis() {
        let mut account = Account::new(10_000.0);
        account.apply_buy(day(1), 10.0, 100.0, 0.0);
        let outcome = account.apply_sell(day(2), 4.0, 90.0, 0.0);
        assert_eq!(outcome.trade().unwrap().realized_pnl, Some(-40.0));
        assert_eq!(account.position().quantity, 6.0);
        assert_eq!(account.position().avg_cost, 100.0);
        assert_eq!(account.realized_pnl(), -40.0);
    }

    #[test]
    fn oversized_and_flat_sells_are_rejected() {
        let mut account = Account::new(1000.0);
        assert_eq!(
            account.apply_sell(day(1), 1.0, 10.0, 0.0),
            OrderOutcome::Rejected(RejectReason::NoPosition)
        );
        account.apply_buy(day(1), 2.0, 10.0, 0.0);
        assert!(matches!(
            account.apply_sell(day(2), 3.0, 10.0, 0.0),
            OrderOutcome::Rejected(RejectReason::OversizedSell { .. })
        ));
        assert_eq!(account.position().quantity, 2.0);
    }

    #[test]
    fn mark_to_market_is_pure() {
        let mut account = Account::new(1000.0);
        account.apply_buy(day(1), 5.0, 100.0, 0.0);
        assert_eq!(account.mark_to_market(120.0), 1100.0);
        assert_eq!(account.mark_to_market(80.0), 900.0);
        assert_eq!(account.cash(), 500.0);
    }

    #[test]
    fn rejects_invalid_inputs() {
        let mut account = Account::new(1000.0);
        assert!(matches!(
            account.apply_buy(day(1), -1.0, 10.0, 0.0),
            OrderOutcome::Rejected(RejectReason::InvalidQuantity { .. })
        ));
        assert!(matches!(
            account.apply_buy(day(1), 1.0, f64::NAN, 0.0),
            OrderOutcome::Rejected(RejectReason::InvalidPrice { .. })
        ));
    }
}
