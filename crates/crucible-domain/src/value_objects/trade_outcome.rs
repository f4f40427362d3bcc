use serde::{Deserialize, Serialize};

/// Signed percentage return of one closed trade. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub return_pct: f64,
    pub entry_ts: i64,
    pub exit_ts: i64,
    pub timeframe: String,
}
