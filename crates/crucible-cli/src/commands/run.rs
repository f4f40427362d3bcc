use super::common;
use crucible_application::config::load_config_with_source;
use crucible_application::coordination::ClaimCoordinator;
use crucible_application::ingest;
use crucible_application::leaderboard::build_leaderboard;
use crucible_application::pipeline::{PipelinePorts, StageSettings};
use crucible_application::quota::QuotaGate;
use crucible_application::scheduler::{AdaptiveScheduler, SchedulerControl};
use crucible_domain::repositories::artifacts::ArtifactWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const LEADERBOARD_EXPORT_LIMIT: usize = 100;

pub fn execute(config_path: &Path, cycles: Option<u64>) -> Result<(), String> {
    let (config, config_toml) = load_config_with_source(config_path)?;

    let wiring = common::build_wiring(&config)?;
    let out_dir = PathBuf::from(&config.run.out_dir).join(&config.run.run_id);
    wiring.artifacts.ensure_dir(&out_dir)?;
    wiring
        .artifacts
        .write_config_snapshot_toml(&out_dir.join("config.snapshot.toml"), &config_toml)?;
    let audit_path = out_dir.join("audit.jsonl");

    let control = Arc::new(SchedulerControl::default());
    let mut scheduler = AdaptiveScheduler::new(
        ClaimCoordinator::new(wiring.store.clone()),
        QuotaGate::new(
            config.quota.validate_daily_limit,
            config.quota.score_daily_limit,
        ),
        control.clone(),
        &config.scheduler,
        config.risk.thresholds(),
    );
    let settings = StageSettings::from_config(&config);
    let ports = PipelinePorts {
        bars: wiring.bars.as_ref(),
        optimizer: &wiring.optimizer,
    };

    tracing::info!(
        run_id = %config.run.run_id,
        symbol = %config.run.symbol,
        "starting scheduling loop"
    );

    let mut cycle = 0u64;
    loop {
        cycle += 1;

        // A dead generation service degrades ingest, not the whole loop.
        let inserted = match ingest::ingest_candidates(
            wiring.generation.as_ref(),
            wiring.store.as_ref(),
            config.generation.batch_limit,
        ) {
            Ok(report) => report.inserted,
            Err(err) => {
                tracing::warn!(error = %err, "candidate ingest failed this cycle");
                0
            }
        };

        let report = scheduler.run_cycle(&ports, &settings, wiring.execution.as_ref())?;
        wiring.artifacts.append_audit_jsonl(&audit_path, &report.audit)?;
        tracing::info!(
            cycle,
            mode = %report.mode,
            active = report.active,
            ingested = inserted,
            validated = report.validated,
            scored = report.scored,
            failed = report.failed,
            retried = report.retried,
            reclaimed = report.reclaimed,
            quota_denied = report.quota_denied,
            "cycle complete"
        );

        if control.halted() {
            tracing::error!("risk gate halted the scheduler; stopping");
            break;
        }
        if let Some(max) = cycles {
            if cycle >= max {
                break;
            }
        } else if inserted == 0 && report.processed() == 0 && report.active == 0 {
            tracing::info!("work pool drained; stopping");
            break;
        }

        thread::sleep(Duration::from_millis(config.scheduler.cycle_delay_ms));
    }

    let rows = build_leaderboard(wiring.store.as_ref(), LEADERBOARD_EXPORT_LIMIT)?;
    let leaderboard_path = out_dir.join("leaderboard.csv");
    wiring
        .artifacts
        .write_leaderboard_csv(&leaderboard_path, &rows)?;
    println!(
        "run {} finished after {} cycle(s); {} scored strategies -> {}",
        config.run.run_id,
        cycle,
        rows.len(),
        leaderboard_path.display()
    );
    Ok(())
}
