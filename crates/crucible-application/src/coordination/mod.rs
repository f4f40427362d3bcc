use chrono::Utc;
use crucible_domain::repositories::work_items::{ReleaseOutcome, WorkItemStore};
use crucible_domain::value_objects::work_item::{Stage, WorkItem, WorkStatus};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Drives the ownership protocol over whatever store backs the pool. All
/// mutual exclusion lives in the store's atomic `claim`; this layer adds the
/// stage mapping, wall-clock stamping, and observability.
#[derive(Clone)]
pub struct ClaimCoordinator {
    store: Arc<dyn WorkItemStore>,
}

impl ClaimCoordinator {
    pub fn new(store: Arc<dyn WorkItemStore>) -> Self {
        Self { store }
    }

    pub fn claim(&self, stage: Stage, worker: &str) -> Result<Option<WorkItem>, String> {
        self.claim_at(stage, worker, Utc::now().timestamp())
    }

    pub fn claim_at(
        &self,
        stage: Stage,
        worker: &str,
        now_ts: i64,
    ) -> Result<Option<WorkItem>, String> {
        let claimed = self.store.claim(stage.entry_status(), worker, now_ts)?;
        match &claimed {
            Some(item) => {
                metrics::counter!("crucible.claims_total", "stage" => stage.as_str()).increment(1);
                tracing::debug!(item_id = %item.id, stage = stage.as_str(), worker, "claimed");
            }
            None => {
                metrics::counter!("crucible.claims_empty_total", "stage" => stage.as_str())
                    .increment(1);
            }
        }
        Ok(claimed)
    }

    pub fn release(
        &self,
        id: &str,
        next: WorkStatus,
        outcome: ReleaseOutcome,
    ) -> Result<(), String> {
        self.store.release(id, next, outcome)?;
        metrics::counter!("crucible.releases_total", "status" => next.as_str()).increment(1);
        tracing::debug!(item_id = %id, status = next.as_str(), "released");
        Ok(())
    }

    /// Returns items whose lease elapsed to their entry status, on the
    /// assumption the prior owner crashed. An item is never reclaimable
    /// before the lease elapses; transient slowness keeps its claim.
    pub fn reclaim_stale(&self, lease_secs: i64) -> Result<Vec<String>, String> {
        self.reclaim_stale_at(lease_secs, Utc::now().timestamp())
    }

    pub fn reclaim_stale_at(&self, lease_secs: i64, now_ts: i64) -> Result<Vec<String>, String> {
        let reclaimed = self.store.reclaim_stale(lease_secs, now_ts)?;
        if !reclaimed.is_empty() {
            metrics::counter!("crucible.reclaims_total").increment(reclaimed.len() as u64);
            tracing::warn!(count = reclaimed.len(), "reclaimed stale claims");
        }
        Ok(reclaimed)
    }

    /// Deployment-stage transition out of SCORED: promote to SELECTED or
    /// archive as RETIRED. Any other target is not part of the lifecycle.
    pub fn promote(&self, id: &str, next: WorkStatus) -> Result<(), String> {
        if !matches!(next, WorkStatus::Selected | WorkStatus::Retired) {
            return Err(format!(
                "promotion target must be selected or retired, got {}",
                next.as_str()
            ));
        }
        let item = self
            .store
            .get(id)?
            .ok_or_else(|| format!("unknown work item: {id}"))?;
        if item.status != WorkStatus::Scored {
            return Err(format!(
                "only scored items can be promoted; {id} is {}",
                item.status.as_str()
            ));
        }
        self.release(id, next, ReleaseOutcome::Plain)
    }

    pub fn active_count(&self) -> Result<usize, String> {
        self.store.count_active()
    }

    pub fn status_counts(&self) -> Result<BTreeMap<WorkStatus, usize>, String> {
        self.store.status_counts()
    }
}
