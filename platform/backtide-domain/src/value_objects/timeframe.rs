use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Timeframe {
    /// Annualization factor; daily bars count trading days.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            Timeframe::Daily => 252.0,
            Timeframe::Weekly => 52.0,
            Timeframe::Monthly => 12.0,
            Timeframe::Quarterly => 4.0,
            Timeframe::Yearly => 1.0,
        }
    }

    /// Classifies a median calendar gap. Weekend and holiday gaps still read as daily.
    pub fn from_gap_days(days: i64) -> Self {
        match days {
            i64::MIN..=4 => Timeframe::Daily,
            5..=10 => Timeframe::Weekly,
            11..=45 => Timeframe::Monthly,
            46..=135 => Timeframe::Quarterly,
            _ => Timeframe::Yearly,
        }
    }

    /// Infers the bar interval from the median gap between consecutive timestamps.
    /// Falls back to daily when fewer than two timestamps are available.
    pub fn infer<I>(timestamps: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut prev: Option<NaiveDate> = None;
        let mut gaps: Vec<i64> = Vec::new();
        for ts in timestamps {
            if let Some(p) = prev {
                gaps.push((ts - p).num_days());
            }
            prev = Some(ts);
        }
        if gaps.is_empty() {
            return Timeframe::Daily;
        }
        gaps.sort_unstable();
        Self::from_gap_days(gaps[gaps.len() / 2])
    }
}

#[cfg(test)]
mod tests {
    use super::Timeframe;
    use chrono::{Duration, NaiveDate};

    fn series(start: NaiveDate, step_days: i64, n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| start + Duration::days(step_days * i as i64))
            .collect()
    }

    #[test]
    fn infers_daily_across_weekends() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut days = Vec::new();
        for week in 0..4 {
            for weekday in 0..5 {
                days.push(monday + Duration::days(week * 7 + weekday));
            }
        }
        let tf = Timeframe::infer(days);
        assert_eq!(tf, Timeframe::Daily);
        assert_eq!(tf.periods_per_year(), 252.0);
    }

    #[test]
    fn infers_weekly_and_monthly() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        assert_eq!(Timeframe::infer(series(start, 7, 10)), Timeframe::Weekly);
        assert_eq!(Timeframe::infer(series(start, 30, 10)), Timeframe::Monthly);
        assert_eq!(Timeframe::infer(series(start, 1, 1)), Timeframe::Daily);
    }
}
