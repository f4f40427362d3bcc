use crate::persistence::validate_table_name;
use crucible_domain::repositories::market_data::{BarRepository, BarsQuery};
use crucible_domain::value_objects::bar::Bar;
use postgres::NoTls;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use std::time::Instant;

/// Read-only bar series loads from the market-data collaborator's table.
#[derive(Clone, Debug)]
pub struct PostgresBarRepository {
    pool: Pool<PostgresConnectionManager<NoTls>>,
    table: String,
}

impl PostgresBarRepository {
    pub fn new(db_url: &str, table: String, pool_max_size: u32) -> Result<Self, String> {
        validate_table_name(&table).map_err(|err| format!("invalid bars_table: {err}"))?;
        let config = db_url
            .parse::<postgres::Config>()
            .map_err(|err| format!("invalid postgres db url: {err}"))?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_max_size)
            .build(manager)
            .map_err(|err| format!("failed to build postgres pool: {err}"))?;
        Ok(Self { pool, table })
    }
}

impl BarRepository for PostgresBarRepository {
    fn load_bars(&self, query: &BarsQuery) -> Result<Vec<Bar>, String> {
        let start = Instant::now();
        let span = tracing::info_span!(
            "infra.postgres.load_bars",
            symbol = %query.symbol,
            timeframe = %query.timeframe
        );
        let _enter = span.enter();

        let mut client = self
            .pool
            .get()
            .map_err(|err| format!("failed to checkout postgres connection: {err}"))?;
        let sql = format!(
            "SELECT timestamp, open, high, low, close, volume FROM {} \
             WHERE symbol = $1 AND timeframe = $2 \
             AND ($3::BIGINT IS NULL OR timestamp >= $3) \
             AND ($4::BIGINT IS NULL OR timestamp <= $4) \
             ORDER BY timestamp ASC",
            self.table
        );
        let rows = client
            .query(
                &sql,
                &[&query.symbol, &query.timeframe, &query.start_ts, &query.end_ts],
            )
            .map_err(|err| format!("failed to query bars: {err}"))?;

        let mut bars: Vec<Bar> = Vec::with_capacity(rows.len());
        let mut dropped = 0usize;
        for row in rows {
            let close: f64 = row.get(4);
            if !close.is_finite() || close <= 0.0 {
                dropped += 1;
                continue;
            }
            let bar = Bar {
                symbol: query.symbol.clone(),
                timestamp: row.get(0),
                open: row.get(1),
                high: row.get(2),
                low: row.get(3),
                close,
                volume: row.get(5),
            };
            // Duplicate timestamps keep the last row seen.
            if let Some(last) = bars.last_mut() {
                if last.timestamp == bar.timestamp {
                    *last = bar;
                    dropped += 1;
                    continue;
                }
            }
            bars.push(bar);
        }

        metrics::histogram!("crucible.infra.postgres.load_bars_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        metrics::gauge!("crucible.infra.postgres.bars_loaded").set(bars.len() as f64);
        tracing::debug!(bars = bars.len(), dropped, "loaded bar series");
        Ok(bars)
    }
}
