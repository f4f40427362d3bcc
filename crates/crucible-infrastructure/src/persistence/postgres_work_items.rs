use crate::persistence::validate_table_name;
use crucible_domain::entities::metric_set::MetricSet;
use crucible_domain::repositories::work_items::{ReleaseOutcome, WorkItemStore};
use crucible_domain::value_objects::work_item::{
    FailureReason, StrategyPayload, WorkItem, WorkStatus,
};
use postgres::NoTls;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use std::collections::BTreeMap;
use std::time::Instant;

/// Durable work item store on Postgres. The claim is one UPDATE over a
/// `FOR UPDATE SKIP LOCKED` subselect, so concurrent workers on separate
/// connections can never receive the same row.
#[derive(Clone, Debug)]
pub struct PostgresWorkItemStore {
    pool: Pool<PostgresConnectionManager<NoTls>>,
    table: String,
}

impl PostgresWorkItemStore {
    pub fn new(db_url: &str, table: String, pool_max_size: u32) -> Result<Self, String> {
        validate_table_name(&table).map_err(|err| format!("invalid work_items_table: {err}"))?;
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

    /// Creates the backing table when it does not exist yet.
    pub fn ensure_schema(&self) -> Result<(), String> {
        let mut client = self.checkout()?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id TEXT PRIMARY KEY,\
             payload TEXT NOT NULL,\
             status TEXT NOT NULL,\
             owner TEXT,\
             claimed_at BIGINT,\
             claimed_from TEXT,\
             created_at BIGINT NOT NULL,\
             failure TEXT,\
             stability DOUBLE PRECISION,\
             weighted TEXT)",
            self.table
        );
        client
            .batch_execute(&ddl)
            .map_err(|err| format!("failed to ensure work item schema: {err}"))
    }

    fn checkout(
        &self,
    ) -> Result<r2d2::PooledConnection<PostgresConnectionManager<NoTls>>, String> {
        let start = Instant::now();
        let client = self
            .pool
            .get()
            .map_err(|err| format!("failed to checkout postgres connection: {err}"))?;
        metrics::histogram!("crucible.infra.postgres.pool.get_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        Ok(client)
    }
}

impl WorkItemStore for PostgresWorkItemStore {
    fn insert(&self, item: WorkItem) -> Result<bool, String> {
        let payload = serde_json::to_string(&item.payload)
            .map_err(|err| format!("failed to serialize payload: {err}"))?;
        let mut client = self.checkout()?;
        let query = format!(
            "INSERT INTO {} (id, payload, status, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO NOTHING",
            self.table
        );
        let rows = client
            .execute(
                &query,
                &[
                    &item.id,
                    &payload,
                    &item.status.as_str(),
                    &item.created_at,
                ],
            )
            .map_err(|err| format!("failed to insert work item: {err}"))?;
        Ok(rows == 1)
    }

    fn claim(
        &self,
        entry: WorkStatus,
        worker: &str,
        now_ts: i64,
    ) -> Result<Option<WorkItem>, String> {
        let start = Instant::now();
        let mut client = self.checkout()?;
        let query = format!(
            "UPDATE {t} SET owner = $1, claimed_at = $2, claimed_from = status, \
             status = 'claimed' \
             WHERE id = (SELECT id FROM {t} WHERE status = $3 AND owner IS NULL \
             ORDER BY created_at, id LIMIT 1 FOR UPDATE SKIP LOCKED) \
             RETURNING id, payload, created_at, failure, stability, weighted",
            t = self.table
        );
        let rows = client
            .query(&query, &[&worker, &now_ts, &entry.as_str()])
            .map_err(|err| format!("failed to claim work item: {err}"))?;
        metrics::histogram!("crucible.infra.postgres.claim_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let payload: String = row.get(1);
        let payload: StrategyPayload = serde_json::from_str(&payload)
            .map_err(|err| format!("corrupt payload for claimed item: {err}"))?;
        let failure: Option<String> = row.get(3);
        let failure = match failure {
            Some(raw) => Some(
                serde_json::from_str::<FailureReason>(&raw)
                    .map_err(|err| format!("corrupt failure record: {err}"))?,
            ),
            None => None,
        };
        let weighted: Option<String> = row.get(5);
        let weighted = match weighted {
            Some(raw) => Some(
                serde_json::from_str::<MetricSet>(&raw)
                    .map_err(|err| format!("corrupt weighted record: {err}"))?,
            ),
            None => None,
        };
        Ok(Some(WorkItem {
            id: row.get(0),
            payload,
            status: WorkStatus::Claimed,
            owner: Some(worker.to_string()),
            claimed_at: Some(now_ts),
            claimed_from: Some(entry),
            created_at: row.get(2),
            failure,
            stability: row.get(4),
            weighted,
        }))
    }

    fn release(&self, id: &str, next: WorkStatus, outcome: ReleaseOutcome) -> Result<(), String> {
        let mut failure: Option<String> = None;
        let mut stability: Option<f64> = None;
        let mut weighted: Option<String> = None;
        match outcome {
            ReleaseOutcome::Plain => {}
            ReleaseOutcome::Validated { stability: value } => stability = Some(value),
            ReleaseOutcome::Failed(reason) => {
                failure = Some(
                    serde_json::to_string(&reason)
                        .map_err(|err| format!("failed to serialize failure: {err}"))?,
                );
            }
            ReleaseOutcome::Scored(metric) => {
                weighted = Some(
                    serde_json::to_string(&metric)
                        .map_err(|err| format!("failed to serialize weighted metrics: {err}"))?,
                );
            }
        }

        let mut client = self.checkout()?;
        let query = format!(
            "UPDATE {} SET status = $2, owner = NULL, claimed_at = NULL, claimed_from = NULL, \
             failure = COALESCE($3, failure), stability = COALESCE($4, stability), \
             weighted = COALESCE($5, weighted) \
             WHERE id = $1 AND status NOT IN ('failed', 'retired')",
            self.table
        );
        let rows = client
            .execute(
                &query,
                &[&id, &next.as_str(), &failure, &stability, &weighted],
            )
            .map_err(|err| format!("failed to release work item: {err}"))?;
        if rows == 0 {
            return Err(format!("release of {id} affected no rows"));
        }
        Ok(())
    }

    fn reclaim_stale(&self, lease_secs: i64, now_ts: i64) -> Result<Vec<String>, String> {
        let cutoff = now_ts - lease_secs;
        let mut client = self.checkout()?;
        let query = format!(
            "UPDATE {} SET status = COALESCE(claimed_from, 'new'), owner = NULL, \
             claimed_at = NULL, claimed_from = NULL \
             WHERE status = 'claimed' AND owner IS NOT NULL AND claimed_at < $1 \
             RETURNING id",
            self.table
        );
        let rows = client
            .query(&query, &[&cutoff])
            .map_err(|err| format!("failed to reclaim stale items: {err}"))?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    fn count_active(&self) -> Result<usize, String> {
        let mut client = self.checkout()?;
        let query = format!(
            "SELECT COUNT(*) FROM {} WHERE status IN ('new', 'claimed', 'validated')",
            self.table
        );
        let row = client
            .query_one(&query, &[])
            .map_err(|err| format!("failed to count active items: {err}"))?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }

    fn status_counts(&self) -> Result<BTreeMap<WorkStatus, usize>, String> {
        let mut client = self.checkout()?;
        let query = format!("SELECT status, COUNT(*) FROM {} GROUP BY status", self.table);
        let rows = client
            .query(&query, &[])
            .map_err(|err| format!("failed to count statuses: {err}"))?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let status: String = row.get(0);
            let count: i64 = row.get(1);
            counts.insert(WorkStatus::parse(&status)?, count as usize);
        }
        Ok(counts)
    }

    fn get(&self, id: &str) -> Result<Option<WorkItem>, String> {
        let mut client = self.checkout()?;
        let query = format!(
            "SELECT id, payload, status, owner, claimed_at, claimed_from, created_at, \
             failure, stability, weighted FROM {} WHERE id = $1",
            self.table
        );
        let rows = client
            .query(&query, &[&id])
            .map_err(|err| format!("failed to fetch work item: {err}"))?;
        rows.first().map(row_to_item).transpose()
    }

    fn fetch_scored(&self, limit: usize) -> Result<Vec<WorkItem>, String> {
        let mut client = self.checkout()?;
        let query = format!(
            "SELECT id, payload, status, owner, claimed_at, claimed_from, created_at, \
             failure, stability, weighted FROM {} WHERE status = 'scored'",
            self.table
        );
        let rows = client
            .query(&query, &[])
            .map_err(|err| format!("failed to fetch scored items: {err}"))?;
        let mut scored = rows
            .iter()
            .map(row_to_item)
            .collect::<Result<Vec<_>, _>>()?;
        // Weighted metrics live in a JSON column, so ordering happens here
        // rather than in SQL.
        scored.sort_by(|a, b| {
            let a_sharpe = a.weighted.map(|w| w.sharpe).unwrap_or(f64::NEG_INFINITY);
            let b_sharpe = b.weighted.map(|w| w.sharpe).unwrap_or(f64::NEG_INFINITY);
            b_sharpe.total_cmp(&a_sharpe)
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

fn row_to_item(row: &postgres::Row) -> Result<WorkItem, String> {
    let payload: String = row.get(1);
    let payload: StrategyPayload =
        serde_json::from_str(&payload).map_err(|err| format!("corrupt payload: {err}"))?;
    let status: String = row.get(2);
    let claimed_from: Option<String> = row.get(5);
    let claimed_from = claimed_from
        .as_deref()
        .map(WorkStatus::parse)
        .transpose()?;
    let failure: Option<String> = row.get(7);
    let failure = failure
        .as_deref()
        .map(serde_json::from_str::<FailureReason>)
        .transpose()
        .map_err(|err| format!("corrupt failure record: {err}"))?;
    let weighted: Option<String> = row.get(9);
    let weighted = weighted
        .as_deref()
        .map(serde_json::from_str::<MetricSet>)
        .transpose()
        .map_err(|err| format!("corrupt weighted record: {err}"))?;
    Ok(WorkItem {
        id: row.get(0),
        payload,
        status: WorkStatus::parse(&status)?,
        owner: row.get(3),
        claimed_at: row.get(4),
        claimed_from,
        created_at: row.get(6),
        failure,
        stability: row.get(8),
        weighted,
    })
}
