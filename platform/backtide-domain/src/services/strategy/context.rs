use crate::entities::account::Account;
use crate::services::engine::execution::{CashShortfall, ExecutionPolicy, OversizedSell};
use crate::value_objects::bar::Bar;
use crate::value_objects::order::{OrderOutcome, OrderSize, OrderStats, RejectReason};
use crate::value_objects::position::Position;
use tracing::debug;

/// What a strategy sees on one bar: the history up to and including the
/// current bar, a read view of the account, and order entry.
///
/// Orders resolve immediately at the current bar's close.
pub struct BarContext<'a> {
    history: &'a [Bar],
    account: &'a mut Account,
    commission_rate: f64,
    policy: ExecutionPolicy,
    stats: &'a mut OrderStats,
}

impl<'a> BarContext<'a> {
    /// `history` must be non-empty; its last element is the current bar.
    pub(crate) fn new(
        history: &'a [Bar],
        account: &'a mut Account,
        commission_rate: f64,
        policy: ExecutionPolicy,
        stats: &'a mut OrderStats,
    ) -> Self {
        debug_assert!(!history.is_empty());
        Self {
            history,
            account,
            commission_rate,
            policy,
            stats,
        }
    }

    pub fn bar(&self) -> &Bar {
        &self.history[self.history.len() - 1]
    }

    pub fn history(&self) -> &[Bar] {
        self.history
    }

    /// Zero-based index of the current bar within the run.
    pub fn index(&self) -> usize {
        self.history.len() - 1
    }

    pub fn cash(&self) -> f64 {
        self.account.cash()
    }

    pub fn position(&self) -> &Position {
        self.account.position()
    }

    pub fn position_size(&self) -> f64 {
        self.account.position().quantity
    }

    pub fn has_position(&self) -> bool {
        !self.account.position().is_flat()
    }

    pub fn equity(&self) -> f64 {
        self.account.mark_to_market(self.bar().close)
    }

    pub fn commission_rate(&self) -> f64 {
        self.commission_rate
    }

    pub fn buy(&mut self, size: OrderSize) -> OrderOutcome {
        let outcome = self.route_buy(size);
        self.finish("buy", size, outcome)
    }

    pub fn sell(&mut self, size: OrderSize) -> OrderOutcome {
        let outcome = self.route_sell(size);
        self.finish("sell", size, outcome)
    }

    pub fn sell_all(&mut self) -> OrderOutcome {
        let held = self.position_size();
        let outcome = if held > 0.0 {
            self.submit_sell(held)
        } else {
            OrderOutcome::Rejected(RejectReason::NoPosition)
        };
        self.finish("sell_all", OrderSize::PercentOfPosition(1.0), outcome)
    }

    pub fn close_position(&mut self) -> OrderOutcome {
        self.sell_all()
    }

    fn route_buy(&mut self, size: OrderSize) -> OrderOutcome {
        let price = self.bar().close;
        let rounding = self.policy.share_rounding;

        let requested = match size {
            OrderSize::Quantity(quantity) => {
                if !quantity.is_finite() || quantity <= 0.0 {
                    return OrderOutcome::Rejected(RejectReason::InvalidQuantity { quantity });
                }
                rounding.apply(quantity)
            }
            OrderSize::PercentOfCash(percent) => {
                if !is_valid_percent(percent) {
                    return OrderOutcome::Rejected(RejectReason::InvalidPercent { percent });
                }
                let budget = self.account.cash() * percent;
                self.policy
                    .affordable_quantity(budget, price, self.commission_rate)
            }
            OrderSize::PercentOfPosition(_) => {
                return OrderOutcome::Rejected(RejectReason::UnsupportedSize)
            }
        };
        if requested <= 0.0 {
            return OrderOutcome::Rejected(RejectReason::ZeroQuantityAfterRounding {
                requested: size_hint(size),
            });
        }

        let timestamp = self.bar().timestamp;
        let outcome = self
            .account
            .apply_buy(timestamp, requested, price, self.commission_rate);

        match (outcome, self.policy.cash_shortfall) {
            (
                OrderOutcome::Rejected(reason @ RejectReason::InsufficientCash { .. }),
                CashShortfall::FillAffordable,
            ) => {
                let affordable = self.policy.affordable_quantity(
                    self.account.cash(),
                    price,
                    self.commission_rate,
                );
                if affordable <= 0.0 {
                    return OrderOutcome::Rejected(reason);
                }
                match self
                    .account
                    .apply_buy(timestamp, affordable, price, self.commission_rate)
                {
                    OrderOutcome::Filled(trade) => OrderOutcome::Clamped { trade, requested },
                    other => other,
                }
            }
            (outcome, _) => outcome,
        }
    }

    fn route_sell(&mut self, size: OrderSize) -> OrderOutcome {
        let held = self.position_size();
        if held <= 0.0 {
            return OrderOutcome::Rejected(RejectReason::NoPosition);
        }

        let requested = match size {
            OrderSize::Quantity(quantity) => {
                if !quantity.is_finite() || quantity <= 0.0 {
                    return OrderOutcome::Rejected(RejectReason::InvalidQuantity { quantity });
                }
                self.policy.share_rounding.apply(quantity)
            }
            OrderSize::PercentOfPosition(percent) => {
                if !is_valid_percent(percent) {
                    return OrderOutcome::Rejected(RejectReason::InvalidPercent { percent });
                }
                if percent == 1.0 {
                    held
                } else {
                    self.policy.share_rounding.apply(held * percent)
                }
            }
            OrderSize::PercentOfCash(_) => {
                return OrderOutcome::Rejected(RejectReason::UnsupportedSize)
            }
        };
        if requested <= 0.0 {
            return OrderOutcome::Rejected(RejectReason::ZeroQuantityAfterRounding {
                requested: size_hint(size),
            });
        }

        if requested <= held {
            return self.submit_sell(requested);
        }
        match self.policy.oversized_sell {
            OversizedSell::Reject => {
                OrderOutcome::Rejected(RejectReason::OversizedSell { requested, held })
            }
            OversizedSell::Clamp => match self.submit_sell(held) {
                OrderOutcome::Filled(trade) => OrderOutcome::Clamped { trade, requested },
                other => other,
            },
        }
    }

    fn submit_sell(&mut self, quantity: f64) -> OrderOutcome {
        let bar = self.bar();
        let (timestamp, price) = (bar.timestamp, bar.close);
        self.account
            .apply_sell(timestamp, quantity, price, self.commission_rate)
    }

    fn finish(&mut self, op: &'static str, size: OrderSize, outcome: OrderOutcome) -> OrderOutcome {
        self.stats.record(&outcome);
        let timestamp = self.bar().timestamp;
        match &outcome {
            OrderOutcome::Filled(trade) => debug!(
                %timestamp,
                op,
                qty = trade.quantity,
                price = trade.price,
                commission = trade.commission,
                cash = self.account.cash(),
                "order filled"
            ),
            OrderOutcome::Clamped { trade, requested } => debug!(
                %timestamp,
                op,
                requested = *requested,
                qty = trade.quantity,
                price = trade.price,
                "order clamped"
            ),
            OrderOutcome::Rejected(reason) => debug!(
                %timestamp,
                op,
                ?size,
                %reason,
                "order rejected"
            ),
        }
        outcome
    }
}

fn is_valid_percent(percent: f64) -> bool {
    percent.is_finite() && (0.0..=1.0).contains(&percent)
}

fn size_hint(size: OrderSize) -> f64 {
    match size {
        OrderSize::Quantity(v) | OrderSize::PercentOfCash(v) | OrderSize::PercentOfPosition(v) => v,
    }
}

#[cfg(test)]
mod tests {
    use super::BarContext;
    use crate::entities::account::Account;
    use crate::services::engine::execution::{
        CashShortfall, ExecutionPolicy, OversizedSell, ShareRounding,
    };
    use crate::value_objects::bar::Bar;
    use crate::value_objects::order::{OrderOutcome, OrderSize, OrderStats, RejectReason};
    use chrono::NaiveDate;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                let ts = NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap();
                Bar::new(ts, *close, *close, *close, *close, 1_000)
            })
            .collect()
    }

    #[test]
    fn exposes_only_history_up_to_current_bar() {
        let series = bars(&[10.0, 11.0, 12.0]);
        let mut account = Account::new(1_000.0);
        let mut stats = OrderStats::default();
        let ctx = BarContext::new(
            &series[..=1],
            &mut account,
            0.0,
            ExecutionPolicy::default(),
            &mut stats,
        );
        assert_eq!(ctx.index(), 1);
        assert_eq!(ctx.bar().close, 11.0);
        assert_eq!(ctx.history().len(), 2);
        let closes: Vec<f64> = ctx.history().iter().map(|bar| bar.close).collect();
        assert_eq!(closes, vec![10.0, 11.0]);
    }

    #[test]
    fn percent_of_cash_buy_uses_whole_units_and_commission() {
        let series = bars(&[100.0]);
        let mut account = Account::new(10_000.0);
        let mut stats = OrderStats::default();
        let mut ctx = BarContext::new(
            &series,
            &mut account,
            0.01,
            ExecutionPolicy::default(),
            &mut stats,
        );
        let outcome = ctx.buy(OrderSize::PercentOfCash(1.0));
        let trade = outcome.trade().expect("filled");
        assert_eq!(trade.quantity, 99.0);
        assert!((trade.commission - 99.0).abs() < 1e-9);
        assert!((ctx.cash() - 1.0).abs() < 1e-9);
        assert_eq!(stats.filled, 1);
    }

    #[test]
    fn oversized_sell_clamps_by_default() {
        let series = bars(&[50.0]);
        let mut account = Account::new(1_000.0);
        let mut stats = OrderStats::default();
        let mut ctx = BarContext::new(
            &series,
            &mut account,
            0.0,
            ExecutionPolicy::default(),
            &mut stats,
        );
        ctx.buy(OrderSize::Quantity(4.0));
        let outcome = ctx.sell(OrderSize::Quantity(10.0));
        match outcome {
            OrderOutcome::Clamped { trade, requested } => {
                assert_eq!(trade.quantity, 4.0);
                assert_eq!(requested, 10.0);
            }
            other => panic!("expected clamp, got {other:?}"),
        }
        assert!(!ctx.has_position());
        assert_eq!(stats.clamped, 1);
    }

    #[test]
    fn oversized_sell_rejected_when_configured() {
        let series = bars(&[50.0]);
        let mut account = Account::new(1_000.0);
        let mut stats = OrderStats::default();
        let policy = ExecutionPolicy {
            oversized_sell: OversizedSell::Reject,
            ..ExecutionPolicy::default()
        };
        let mut ctx = BarContext::new(&series, &mut account, 0.0, policy, &mut stats);
        ctx.buy(OrderSize::Quantity(4.0));
        let outcome = ctx.sell(OrderSize::Quantity(10.0));
        assert!(matches!(
            outcome,
            OrderOutcome::Rejected(RejectReason::OversizedSell { .. })
        ));
        assert_eq!(ctx.position_size(), 4.0);
    }

    #[test]
    fn shortfall_fill_affordable_buys_what_fits() {
        let series = bars(&[100.0]);
        let mut account = Account::new(550.0);
        let mut stats = OrderStats::default();
        let policy = ExecutionPolicy {
            cash_shortfall: CashShortfall::FillAffordable,
            ..ExecutionPolicy::default()
        };
        let mut ctx = BarContext::new(&series, &mut account, 0.0, policy, &mut stats);
        let outcome = ctx.buy(OrderSize::Quantity(10.0));
        match outcome {
            OrderOutcome::Clamped { trade, requested } => {
                assert_eq!(trade.quantity, 5.0);
                assert_eq!(requested, 10.0);
            }
            other => panic!("expected clamp, got {other:?}"),
        }
        assert!((ctx.cash() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_requests_are_rejected_without_effect() {
        let series = bars(&[100.0]);
        let mut account = Account::new(1_000.0);
        let mut stats = OrderStats::default();
        let mut ctx = BarContext::new(
            &series,
            &mut account,
            0.0,
            ExecutionPolicy::default(),
            &mut stats,
        );
        assert!(ctx.buy(OrderSize::PercentOfCash(1.5)).is_rejected());
        assert!(ctx.buy(OrderSize::PercentOfPosition(0.5)).is_rejected());
        assert!(ctx.buy(OrderSize::Quantity(0.4)).is_rejected());
        assert!(ctx.sell(OrderSize::Quantity(1.0)).is_rejected());
        assert!(ctx.sell_all().is_rejected());
        assert_eq!(ctx.cash(), 1_000.0);
        assert_eq!(stats.rejected, 5);
    }

    #[test]
    fn close_position_sells_the_whole_holding() {
        let series = bars(&[40.0]);
        let mut account = Account::new(1_000.0);
        let mut stats = OrderStats::default();
        let mut ctx = BarContext::new(
            &series,
            &mut account,
            0.0,
            ExecutionPolicy::default(),
            &mut stats,
        );
        ctx.buy(OrderSize::Quantity(7.0));
        let outcome = ctx.close_position();
        assert_eq!(outcome.trade().map(|t| t.quantity), Some(7.0));
        assert!(!ctx.has_position());
        assert!(ctx.close_position().is_rejected());
        assert_eq!(ctx.cash(), 1_000.0);
    }

    #[test]
    fn fractional_rounding_keeps_partial_units() {
        let series = bars(&[100.0]);
        let mut account = Account::new(1_000.0);
        let mut stats = OrderStats::default();
        let policy = ExecutionPolicy {
            share_rounding: ShareRounding::Fractional,
            ..ExecutionPolicy::default()
        };
        let mut ctx = BarContext::new(&series, &mut account, 0.0, policy, &mut stats);
        ctx.buy(OrderSize::Quantity(2.5));
        let sold = ctx.sell(OrderSize::PercentOfPosition(0.5));
        assert_eq!(sold.trade().unwrap().quantity, 1.25);
        assert_eq!(ctx.position_size(), 1.25);
    }
}
