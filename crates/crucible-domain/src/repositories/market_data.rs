use crate::value_objects::bar::Bar;

#[derive(Debug, Clone)]
pub struct BarsQuery {
    pub symbol: String,
    pub timeframe: String,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
}

/// Ordered bar series from the market-data collaborator. The core never
/// mutates what it receives.
pub trait BarRepository: Send + Sync {
    fn load_bars(&self, query: &BarsQuery) -> Result<Vec<Bar>, String>;
}
