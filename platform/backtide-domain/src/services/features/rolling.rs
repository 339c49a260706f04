use std::collections::VecDeque;

/// Mean of the last `window` values, or `None` when there are fewer.
pub fn sma(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let slice = &values[values.len() - window..];
    Some(slice.iter().sum::<f64>() / window as f64)
}

/// Relative strength index over simple averages of close-to-close changes.
#[derive(Debug, Clone)]
pub struct RollingRsi {
    window: usize,
    prev_close: Option<f64>,
    diffs: VecDeque<f64>,
    sum_gains: f64,
    sum_losses: f64,
}

impl RollingRsi {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            prev_close: None,
            diffs: VecDeque::new(),
            sum_gains: 0.0,
            sum_losses: 0.0,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let prev = self.prev_close.replace(close)?;
        if self.window == 0 || !prev.is_finite() || !close.is_finite() {
            return None;
        }

        let diff = close - prev;
        self.diffs.push_back(diff);
        if diff > 0.0 {
            self.sum_gains += diff;
        } else {
            self.sum_losses -= diff;
        }

        while self.diffs.len() > self.window {
            if let Some(front) = self.diffs.pop_front() {
                if front > 0.0 {
                    self.sum_gains -= front;
                } else {
                    self.sum_losses += front;
                }
            }
        }

        if self.diffs.len() < self.window {
            return None;
        }

        let gains = self.sum_gains.max(0.0);
        let losses = self.sum_losses.max(0.0);
        if gains + losses == 0.0 {
            return Some(50.0);
        }
        if losses == 0.0 {
            return Some(100.0);
        }
        let rs = gains / losses;
        Some(100.0 - (100.0 / (1.0 + rs)))
    }
}

#[cfg(test)]
mod tests {
    use super::{sma, RollingRsi};

    #[test]
    fn sma_uses_trailing_window() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(sma(&values, 2), Some(3.5));
        assert_eq!(sma(&values, 4), Some(2.5));
        assert_eq!(sma(&values, 5), None);
        assert_eq!(sma(&values, 0), None);
    }

    #[test]
    fn rsi_saturates_on_monotonic_moves() {
        let mut up = RollingRsi::new(3);
        let last = [1.0, 2.0, 3.0, 4.0].iter().map(|c| up.update(*c)).last();
        assert_eq!(last, Some(Some(100.0)));

        let mut down = RollingRsi::new(3);
        let last = [4.0, 3.0, 2.0, 1.0].iter().map(|c| down.update(*c)).last();
        assert_eq!(last, Some(Some(0.0)));
    }

    #[test]
    fn rsi_is_midpoint_for_balanced_moves() {
        let mut rsi = RollingRsi::new(2);
        assert_eq!(rsi.update(10.0), None);
        assert_eq!(rsi.update(11.0), None);
        let value = rsi.update(10.0).expect("window filled");
        assert!((value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_flat_prices_read_neutral() {
        let mut rsi = RollingRsi::new(2);
        let last = [10.0, 10.0, 10.0].iter().map(|c| rsi.update(*c)).last();
        assert_eq!(last, Some(Some(50.0)));
    }
}
