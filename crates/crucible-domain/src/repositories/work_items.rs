use crate::entities::metric_set::MetricSet;
use crate::value_objects::work_item::{FailureReason, WorkItem, WorkStatus};
use std::collections::BTreeMap;

/// Extra state recorded alongside a release.
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    /// No extra state; used to return an item to its entry status after an
    /// infrastructure failure.
    Plain,
    /// Validation passed; walk-forward stability travels with the item.
    Validated { stability: f64 },
    Failed(FailureReason),
    Scored(MetricSet),
}

/// Shared durable store of work items. Every implementation must make
/// `claim` a single atomic step: under arbitrary concurrent callers, at most
/// one caller receives a given item per claim cycle. Timestamps are passed in
/// by the caller so the protocol stays deterministic under test.
pub trait WorkItemStore: Send + Sync {
    /// Inserts a new item; returns false when the fingerprint already exists.
    fn insert(&self, item: WorkItem) -> Result<bool, String>;

    /// Atomically selects one unowned item in `entry` status, stamps the
    /// caller as owner with `claimed_at = now_ts`, and returns it.
    fn claim(&self, entry: WorkStatus, worker: &str, now_ts: i64)
        -> Result<Option<WorkItem>, String>;

    /// Clears ownership and moves the item to `next`. Terminal items are
    /// never modified again except for explicit archival.
    fn release(&self, id: &str, next: WorkStatus, outcome: ReleaseOutcome) -> Result<(), String>;

    /// Returns claimed items whose lease has elapsed
    /// (`now_ts - claimed_at > lease_secs`) to the status they were claimed
    /// from, clearing ownership. Returns the reclaimed ids.
    fn reclaim_stale(&self, lease_secs: i64, now_ts: i64) -> Result<Vec<String>, String>;

    /// Items still moving through the pipeline (not terminal, not selected).
    fn count_active(&self) -> Result<usize, String>;

    fn status_counts(&self) -> Result<BTreeMap<WorkStatus, usize>, String>;

    fn get(&self, id: &str) -> Result<Option<WorkItem>, String>;

    /// Scored items for the ranking stage, best weighted Sharpe first.
    fn fetch_scored(&self, limit: usize) -> Result<Vec<WorkItem>, String>;
}
