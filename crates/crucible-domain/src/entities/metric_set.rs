use serde::{Deserialize, Serialize};

/// Read-only aggregate over a sequence of trade outcomes. Computed once per
/// window by the metrics engine and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub sharpe: f64,
    pub expectancy: f64,
    pub win_rate: f64,
    pub trade_count: usize,
    pub stability: f64,
}

impl Default for MetricSet {
    fn default() -> Self {
        Self::neutral()
    }
}

impl MetricSet {
    /// Neutral set returned for malformed or empty input; callers that need to
    /// reject empty results do so via minimum-trade-count checks upstream.
    pub fn neutral() -> Self {
        Self {
            sharpe: 0.0,
            expectancy: 0.0,
            win_rate: 0.0,
            trade_count: 0,
            stability: 0.0,
        }
    }
}
