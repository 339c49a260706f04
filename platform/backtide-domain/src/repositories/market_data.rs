use crate::value_objects::bar::Bar;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarQuery {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Port for the data provider that supplies daily bars for one instrument.
pub trait MarketDataRepository {
    fn load_bars(&self, query: &BarQuery) -> Result<Vec<Bar>, String>;
}

/// Serves a fixed series, already loaded in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBars {
    bars: Vec<Bar>,
}

impl InMemoryBars {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars }
    }
}

impl MarketDataRepository for InMemoryBars {
    fn load_bars(&self, query: &BarQuery) -> Result<Vec<Bar>, String> {
        Ok(self
            .bars
            .iter()
            .filter(|bar| bar.timestamp >= query.start && bar.timestamp <= query.end)
            .cloned()
            .collect())
    }
}
