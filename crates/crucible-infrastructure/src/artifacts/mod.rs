use crucible_domain::repositories::artifacts::{ArtifactWriter, LeaderboardRow};
use crucible_domain::services::audit::AuditEvent;
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemArtifacts;

impl FilesystemArtifacts {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactWriter for FilesystemArtifacts {
    fn ensure_dir(&self, path: &Path) -> Result<(), String> {
        fs::create_dir_all(path)
            .map_err(|err| format!("failed to create dir {}: {}", path.display(), err))
    }

    fn write_leaderboard_csv(&self, path: &Path, rows: &[LeaderboardRow]) -> Result<(), String> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed to create dir {}: {err}", parent.display()))?;

        let mut wtr = csv::Writer::from_path(path)
            .map_err(|err| format!("failed to create {}: {err}", path.display()))?;
        wtr.write_record([
            "rank",
            "item_id",
            "kind",
            "timeframe",
            "sharpe",
            "expectancy",
            "win_rate",
            "trade_count",
            "stability",
        ])
        .map_err(|err| format!("failed to write leaderboard header: {err}"))?;

        for (rank, row) in rows.iter().enumerate() {
            wtr.write_record([
                (rank + 1).to_string(),
                row.item_id.clone(),
                row.kind.clone(),
                row.timeframe.clone(),
                row.weighted.sharpe.to_string(),
                row.weighted.expectancy.to_string(),
                row.weighted.win_rate.to_string(),
                row.weighted.trade_count.to_string(),
                row.weighted.stability.to_string(),
            ])
            .map_err(|err| format!("failed to write leaderboard row: {err}"))?;
        }

        wtr.flush()
            .map_err(|err| format!("failed to flush {}: {err}", path.display()))
    }

    fn append_audit_jsonl(&self, path: &Path, events: &[AuditEvent]) -> Result<(), String> {
        if events.is_empty() {
            return Ok(());
        }
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed to create dir {}: {err}", parent.display()))?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| format!("failed to open {}: {err}", path.display()))?;
        for event in events {
            let line = serde_json::to_string(event)
                .map_err(|err| format!("failed to serialize audit event: {err}"))?;
            writeln!(file, "{line}")
                .map_err(|err| format!("failed to append to {}: {err}", path.display()))?;
        }
        Ok(())
    }

    fn write_config_snapshot_toml(&self, path: &Path, contents: &str) -> Result<(), String> {
        fs::write(path, contents).map_err(|err| {
            format!(
                "failed to write config snapshot {}: {}",
                path.display(),
                err
            )
        })
    }
}
