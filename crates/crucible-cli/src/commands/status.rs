use super::common;
use crucible_application::config::load_config;
use crucible_application::monitoring;
use crucible_application::scheduler::{mode_for, ModeThresholds};
use crucible_domain::value_objects::work_item::WorkStatus;
use crucible_infrastructure::execution::HttpExecutionReporter;
use std::path::Path;

const LIVE_METRICS_LIMIT: usize = 10;

const STATUSES: [WorkStatus; 7] = [
    WorkStatus::New,
    WorkStatus::Claimed,
    WorkStatus::Validated,
    WorkStatus::Scored,
    WorkStatus::Selected,
    WorkStatus::Failed,
    WorkStatus::Retired,
];

pub fn execute(config_path: &Path, json: bool) -> Result<(), String> {
    let config = load_config(config_path)?;
    let store = common::build_store(&config)?;

    let counts = store.status_counts()?;
    let active = store.count_active()?;
    let mode = mode_for(
        active,
        &ModeThresholds {
            sequential_max: config.scheduler.sequential_max,
            concurrent_io_max: config.scheduler.concurrent_io_max,
            multi_process_max: config.scheduler.multi_process_max,
        },
    );

    if json {
        let mut by_status = serde_json::Map::new();
        for status in STATUSES {
            by_status.insert(
                status.as_str().to_string(),
                serde_json::json!(counts.get(&status).copied().unwrap_or(0)),
            );
        }
        let out = serde_json::json!({
            "run_id": config.run.run_id,
            "active": active,
            "execution_mode": mode.as_str(),
            "statuses": by_status,
        });
        println!("{}", out);
        return Ok(());
    }

    println!("run: {}", config.run.run_id);
    println!("execution mode: {mode} (active = {active})");
    for status in STATUSES {
        println!(
            "  {:>10}: {}",
            status.as_str(),
            counts.get(&status).copied().unwrap_or(0)
        );
    }

    // Live figures come straight from the execution collaborator, scored by
    // the same metrics engine the pipeline uses.
    if let Some(url) = &config.execution.url {
        let execution = HttpExecutionReporter::new(
            url.clone(),
            config.execution.timeout_ms,
            config.execution.retries,
        )?;
        match monitoring::live_metric_sets(&execution, store.as_ref(), LIVE_METRICS_LIMIT) {
            Ok(live) => {
                for entry in live {
                    println!(
                        "  live {:>12}: expectancy={:.4} sharpe={:.3} trades={}",
                        entry.item_id,
                        entry.live.expectancy,
                        entry.live.sharpe,
                        entry.live.trade_count
                    );
                }
            }
            Err(err) => tracing::warn!(error = %err, "live metrics unavailable"),
        }
    }
    Ok(())
}
