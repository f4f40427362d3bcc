use serde::{Deserialize, Serialize};

/// Bar resolution of a market data series. Annualization of per-bar statistics
/// scales with `bars_per_day`, never with a fixed daily factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub label: String,
    pub step_seconds: i64,
}

impl Timeframe {
    pub fn parse(value: &str) -> Result<Self, String> {
        let normalized = value.trim().to_lowercase();
        let (label, step_seconds) = match normalized.as_str() {
            "5m" | "5min" => ("5min", 300),
            "15m" | "15min" => ("15min", 900),
            "30m" | "30min" => ("30min", 1800),
            "1h" | "1hour" => ("1hour", 3600),
            "4h" | "4hour" => ("4hour", 14400),
            "1d" | "1day" => ("1day", 86400),
            _ => return Err(format!("unsupported timeframe: {value}")),
        };
        Ok(Self {
            label: label.to_string(),
            step_seconds,
        })
    }

    /// Number of bars in one trading day at this resolution
    /// (1day -> 1, 4hour -> 6, 1hour -> 24, 30min -> 48, 15min -> 96, 5min -> 288).
    pub fn bars_per_day(&self) -> f64 {
        86_400.0 / self.step_seconds as f64
    }
}
