use crucible_domain::repositories::work_items::{ReleaseOutcome, WorkItemStore};
use crucible_domain::value_objects::work_item::{WorkItem, WorkStatus};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Mutex-map realization of the claim protocol for single-node runs and
/// tests. The whole map is one critical section, so every operation is
/// trivially atomic; the Postgres store provides the same contract with
/// row-level locking.
#[derive(Default)]
pub struct MemoryWorkItemStore {
    items: Mutex<BTreeMap<String, WorkItem>>,
}

impl MemoryWorkItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl WorkItemStore for MemoryWorkItemStore {
    fn insert(&self, item: WorkItem) -> Result<bool, String> {
        let mut items = self.items.lock();
        if items.contains_key(&item.id) {
            return Ok(false);
        }
        items.insert(item.id.clone(), item);
        Ok(true)
    }

    fn claim(
        &self,
        entry: WorkStatus,
        worker: &str,
        now_ts: i64,
    ) -> Result<Option<WorkItem>, String> {
        let mut items = self.items.lock();
        let candidate = items
            .values_mut()
            .find(|item| item.status == entry && item.owner.is_none());
        let Some(item) = candidate else {
            return Ok(None);
        };
        item.status = WorkStatus::Claimed;
        item.owner = Some(worker.to_string());
        item.claimed_at = Some(now_ts);
        item.claimed_from = Some(entry);
        Ok(Some(item.clone()))
    }

    fn release(&self, id: &str, next: WorkStatus, outcome: ReleaseOutcome) -> Result<(), String> {
        let mut items = self.items.lock();
        let item = items
            .get_mut(id)
            .ok_or_else(|| format!("unknown work item: {id}"))?;
        if item.status.is_terminal() {
            return Err(format!(
                "work item {id} is terminal ({})",
                item.status.as_str()
            ));
        }
        item.status = next;
        item.owner = None;
        item.claimed_at = None;
        item.claimed_from = None;
        match outcome {
            ReleaseOutcome::Plain => {}
            ReleaseOutcome::Validated { stability } => item.stability = Some(stability),
            ReleaseOutcome::Failed(reason) => item.failure = Some(reason),
            ReleaseOutcome::Scored(weighted) => item.weighted = Some(weighted),
        }
        Ok(())
    }

    fn reclaim_stale(&self, lease_secs: i64, now_ts: i64) -> Result<Vec<String>, String> {
        let mut items = self.items.lock();
        let mut reclaimed = Vec::new();
        for item in items.values_mut() {
            if item.status != WorkStatus::Claimed {
                continue;
            }
            let Some(claimed_at) = item.claimed_at else {
                continue;
            };
            if now_ts - claimed_at > lease_secs {
                item.status = item.claimed_from.unwrap_or(WorkStatus::New);
                item.owner = None;
                item.claimed_at = None;
                item.claimed_from = None;
                reclaimed.push(item.id.clone());
            }
        }
        Ok(reclaimed)
    }

    fn count_active(&self) -> Result<usize, String> {
        let items = self.items.lock();
        Ok(items
            .values()
            .filter(|item| {
                matches!(
                    item.status,
                    WorkStatus::New | WorkStatus::Claimed | WorkStatus::Validated
                )
            })
            .count())
    }

    fn status_counts(&self) -> Result<BTreeMap<WorkStatus, usize>, String> {
        let items = self.items.lock();
        let mut counts = BTreeMap::new();
        for item in items.values() {
            *counts.entry(item.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn get(&self, id: &str) -> Result<Option<WorkItem>, String> {
        Ok(self.items.lock().get(id).cloned())
    }

    fn fetch_scored(&self, limit: usize) -> Result<Vec<WorkItem>, String> {
        let items = self.items.lock();
        let mut scored: Vec<WorkItem> = items
            .values()
            .filter(|item| item.status == WorkStatus::Scored)
            .cloned()
            .collect();
        scored.sort_by(|a, b| {
            let a_sharpe = a.weighted.map(|w| w.sharpe).unwrap_or(f64::NEG_INFINITY);
            let b_sharpe = b.weighted.map(|w| w.sharpe).unwrap_or(f64::NEG_INFINITY);
            b_sharpe.total_cmp(&a_sharpe)
        });
        scored.truncate(limit);
        Ok(scored)
    }
}
