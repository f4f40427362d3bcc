use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use crucible_domain::repositories::market_data::{BarRepository, BarsQuery};
use crucible_domain::value_objects::bar::Bar;
use serde::Deserialize;
use std::fs::File;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct CsvBarRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// File-backed bar source for single-node runs without a Postgres store.
/// Rows are sorted on load; duplicate timestamps keep the last row.
#[derive(Debug, Clone)]
pub struct CsvBarRepository {
    path: PathBuf,
}

impl CsvBarRepository {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl BarRepository for CsvBarRepository {
    fn load_bars(&self, query: &BarsQuery) -> Result<Vec<Bar>, String> {
        let file = File::open(&self.path)
            .map_err(|err| format!("failed to open bars CSV {}: {}", self.path.display(), err))?;
        let mut reader = csv::Reader::from_reader(file);

        let mut bars: Vec<Bar> = Vec::new();
        for result in reader.deserialize::<CsvBarRecord>() {
            let record = result.map_err(|err| format!("failed to parse CSV row: {err}"))?;
            let timestamp = parse_timestamp(&record.timestamp)?;
            if !record.close.is_finite() || record.close <= 0.0 {
                continue;
            }
            if query.start_ts.is_some_and(|start| timestamp < start)
                || query.end_ts.is_some_and(|end| timestamp > end)
            {
                continue;
            }
            bars.push(Bar {
                symbol: query.symbol.clone(),
                timestamp,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                volume: record.volume,
            });
        }

        bars.sort_by_key(|bar| bar.timestamp);
        bars.dedup_by(|next, kept| {
            if next.timestamp == kept.timestamp {
                *kept = next.clone();
                true
            } else {
                false
            }
        });
        Ok(bars)
    }
}

fn parse_timestamp(value: &str) -> Result<i64, String> {
    let trimmed = value.trim();
    if let Ok(epoch) = trimmed.parse::<i64>() {
        return Ok(epoch);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive).timestamp());
    }
    Err(format!("unsupported timestamp format: {value}"))
}
