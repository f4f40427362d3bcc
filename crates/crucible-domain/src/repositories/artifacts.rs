use crate::entities::metric_set::MetricSet;
use crate::services::audit::AuditEvent;
use serde::Serialize;
use std::path::Path;

/// One row of the scored-strategy leaderboard.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub item_id: String,
    pub kind: String,
    pub timeframe: String,
    pub weighted: MetricSet,
}

pub trait ArtifactWriter: Send + Sync {
    fn ensure_dir(&self, path: &Path) -> Result<(), String>;

    fn write_leaderboard_csv(&self, path: &Path, rows: &[LeaderboardRow]) -> Result<(), String>;

    /// Appends events to a JSONL audit trail; never rewrites existing lines.
    fn append_audit_jsonl(&self, path: &Path, events: &[AuditEvent]) -> Result<(), String>;

    fn write_config_snapshot_toml(&self, path: &Path, contents: &str) -> Result<(), String>;
}
