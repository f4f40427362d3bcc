use crate::config::SchedulerConfig;
use crate::coordination::ClaimCoordinator;
use crate::pipeline::{self, PipelinePorts, StageOutcome, StageSettings};
use crate::quota::QuotaGate;
use chrono::Utc;
use crucible_domain::repositories::execution::ExecutionReporter;
use crucible_domain::repositories::work_items::ReleaseOutcome;
use crucible_domain::services::audit::AuditEvent;
use crucible_domain::services::risk::{self, RiskThresholds, RiskVerdict};
use crucible_domain::value_objects::work_item::Stage;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// How aggressively the pool claims, chosen purely from the active item
/// count. There is no hidden state beyond the count itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    ConcurrentIo,
    MultiProcess,
    Hybrid,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::ConcurrentIo => "concurrent_io",
            ExecutionMode::MultiProcess => "multi_process",
            ExecutionMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModeThresholds {
    pub sequential_max: usize,
    pub concurrent_io_max: usize,
    pub multi_process_max: usize,
}

pub fn mode_for(active: usize, thresholds: &ModeThresholds) -> ExecutionMode {
    if active <= thresholds.sequential_max {
        ExecutionMode::Sequential
    } else if active <= thresholds.concurrent_io_max {
        ExecutionMode::ConcurrentIo
    } else if active <= thresholds.multi_process_max {
        ExecutionMode::MultiProcess
    } else {
        ExecutionMode::Hybrid
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSizes {
    pub sequential: usize,
    pub concurrent_io: usize,
    pub multi_process: usize,
    pub hybrid: usize,
}

impl PoolSizes {
    pub fn parallelism(&self, mode: ExecutionMode) -> usize {
        match mode {
            ExecutionMode::Sequential => self.sequential,
            ExecutionMode::ConcurrentIo => self.concurrent_io,
            ExecutionMode::MultiProcess => self.multi_process,
            ExecutionMode::Hybrid => self.hybrid,
        }
        .max(1)
    }
}

/// Cooperative stop flags shared with workers. Checked between claims, never
/// mid-item: a stop request waits for in-flight claims to finish, or for the
/// lease to recover them.
#[derive(Debug, Default)]
pub struct SchedulerControl {
    cancel: AtomicBool,
    halted: AtomicBool,
}

impl SchedulerControl {
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn halt(&self) {
        self.halted.store(true, Ordering::Relaxed);
    }

    /// Observable system-wide halt flag; requires an operator reset, not an
    /// exception handler.
    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    pub fn clear_halt(&self) {
        self.halted.store(false, Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.cancelled() || self.halted()
    }
}

#[derive(Debug)]
pub struct CycleReport {
    pub verdict: RiskVerdict,
    pub mode: ExecutionMode,
    pub active: usize,
    pub reclaimed: usize,
    pub validated: usize,
    pub scored: usize,
    pub failed: usize,
    pub retried: usize,
    pub quota_denied: usize,
    pub audit: Vec<AuditEvent>,
}

impl CycleReport {
    pub fn processed(&self) -> usize {
        self.validated + self.scored + self.failed
    }
}

#[derive(Default)]
struct CycleCounters {
    validated: AtomicUsize,
    scored: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    quota_denied: AtomicUsize,
}

/// Sizes a bounded worker pool from the current load and drains claimed work
/// through the pipeline. Mode switches only change how many new claims are
/// issued; they never interrupt an item a worker already owns.
pub struct AdaptiveScheduler {
    coordinator: ClaimCoordinator,
    quota: QuotaGate,
    control: Arc<SchedulerControl>,
    thresholds: ModeThresholds,
    pools: PoolSizes,
    lease_secs: i64,
    risk_thresholds: RiskThresholds,
    last_mode: Option<ExecutionMode>,
}

impl AdaptiveScheduler {
    pub fn new(
        coordinator: ClaimCoordinator,
        quota: QuotaGate,
        control: Arc<SchedulerControl>,
        scheduler: &SchedulerConfig,
        risk_thresholds: RiskThresholds,
    ) -> Self {
        Self {
            coordinator,
            quota,
            control,
            thresholds: ModeThresholds {
                sequential_max: scheduler.sequential_max,
                concurrent_io_max: scheduler.concurrent_io_max,
                multi_process_max: scheduler.multi_process_max,
            },
            pools: PoolSizes {
                sequential: scheduler.workers_sequential,
                concurrent_io: scheduler.workers_concurrent_io,
                multi_process: scheduler.workers_multi_process,
                hybrid: scheduler.workers_hybrid,
            },
            lease_secs: scheduler.lease_secs,
            risk_thresholds,
            last_mode: None,
        }
    }

    pub fn control(&self) -> Arc<SchedulerControl> {
        self.control.clone()
    }

    pub fn run_cycle(
        &mut self,
        ports: &PipelinePorts,
        settings: &StageSettings,
        execution: &dyn ExecutionReporter,
    ) -> Result<CycleReport, String> {
        let snapshot = execution.risk_snapshot()?;
        let verdict = risk::evaluate(snapshot, &self.risk_thresholds);
        match verdict {
            RiskVerdict::Halt => {
                self.control.halt();
                metrics::counter!("crucible.scheduler.halts_total").increment(1);
                tracing::error!(
                    drawdown_pct = snapshot.drawdown_pct,
                    consecutive_losses = snapshot.consecutive_losses,
                    "risk gate HALT: no further claims will be issued"
                );
            }
            RiskVerdict::Pause => {
                tracing::warn!(
                    drawdown_pct = snapshot.drawdown_pct,
                    consecutive_losses = snapshot.consecutive_losses,
                    "risk gate pause: skipping claims this cycle"
                );
            }
            RiskVerdict::Ok => {}
        }

        // Lease recovery runs even while paused or halted; it only returns
        // crashed claims to their entry status.
        let reclaimed = self.coordinator.reclaim_stale(self.lease_secs)?;

        let active = self.coordinator.active_count()?;
        let mode = mode_for(active, &self.thresholds);
        metrics::gauge!("crucible.scheduler.active_items").set(active as f64);
        if self.last_mode != Some(mode) {
            if let Some(old) = self.last_mode {
                tracing::info!(
                    old = %old,
                    new = %mode,
                    reason = active,
                    "execution mode transition"
                );
                metrics::counter!(
                    "crucible.scheduler.mode_transitions_total",
                    "to" => mode.as_str()
                )
                .increment(1);
            } else {
                tracing::info!(mode = %mode, active, "execution mode selected");
            }
            self.last_mode = Some(mode);
        }

        let counters = CycleCounters::default();
        let audit: Mutex<Vec<AuditEvent>> = Mutex::new(Vec::new());

        if verdict == RiskVerdict::Ok && !self.control.should_stop() {
            let workers = self.pools.parallelism(mode);
            let coordinator = &self.coordinator;
            let quota = &self.quota;
            let control = self.control.as_ref();
            let counters_ref = &counters;
            let audit_ref = &audit;
            thread::scope(|scope| {
                for slot in 0..workers {
                    let worker = format!("worker-{slot}");
                    scope.spawn(move || {
                        worker_loop(
                            &worker,
                            coordinator,
                            quota,
                            control,
                            ports,
                            settings,
                            counters_ref,
                            audit_ref,
                        );
                    });
                }
            });
        }

        Ok(CycleReport {
            verdict,
            mode,
            active,
            reclaimed: reclaimed.len(),
            validated: counters.validated.load(Ordering::Relaxed),
            scored: counters.scored.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            retried: counters.retried.load(Ordering::Relaxed),
            quota_denied: counters.quota_denied.load(Ordering::Relaxed),
            audit: audit.into_inner(),
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    worker: &str,
    coordinator: &ClaimCoordinator,
    quota: &QuotaGate,
    control: &SchedulerControl,
    ports: &PipelinePorts,
    settings: &StageSettings,
    counters: &CycleCounters,
    audit: &Mutex<Vec<AuditEvent>>,
) {
    loop {
        if control.should_stop() {
            break;
        }
        let mut progressed = false;
        // Drain downstream work first so validated items do not pile up.
        for stage in [Stage::Score, Stage::Validate] {
            if control.should_stop() {
                break;
            }
            if process_one(worker, stage, coordinator, quota, ports, settings, counters, audit) {
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn process_one(
    worker: &str,
    stage: Stage,
    coordinator: &ClaimCoordinator,
    quota: &QuotaGate,
    ports: &PipelinePorts,
    settings: &StageSettings,
    counters: &CycleCounters,
    audit: &Mutex<Vec<AuditEvent>>,
) -> bool {
    // Reservation strictly precedes the claim; an unused reservation is
    // handed straight back.
    if !quota.reserve(stage) {
        counters.quota_denied.fetch_add(1, Ordering::Relaxed);
        return false;
    }

    let claimed = match coordinator.claim(stage, worker) {
        Ok(claimed) => claimed,
        Err(err) => {
            quota.release(stage);
            tracing::error!(stage = stage.as_str(), error = %err, "claim failed");
            return false;
        }
    };
    let Some(item) = claimed else {
        quota.release(stage);
        return false;
    };

    let attempt_ts = Utc::now().timestamp();
    match pipeline::process(&item, stage, ports, settings) {
        Ok(StageOutcome::Validated { stability, details }) => {
            finish(
                coordinator,
                &item.id,
                crucible_domain::value_objects::work_item::WorkStatus::Validated,
                ReleaseOutcome::Validated { stability },
            );
            counters.validated.fetch_add(1, Ordering::Relaxed);
            push_audit(audit, &item.id, attempt_ts, stage, worker, "validated", None, details);
        }
        Ok(StageOutcome::Scored { weighted, details }) => {
            finish(
                coordinator,
                &item.id,
                crucible_domain::value_objects::work_item::WorkStatus::Scored,
                ReleaseOutcome::Scored(weighted),
            );
            counters.scored.fetch_add(1, Ordering::Relaxed);
            push_audit(audit, &item.id, attempt_ts, stage, worker, "scored", None, details);
        }
        Ok(StageOutcome::Failed { reason }) => {
            let summary = reason.summary();
            let details = serde_json::to_value(&reason)
                .unwrap_or_else(|_| serde_json::Value::Null);
            finish(
                coordinator,
                &item.id,
                crucible_domain::value_objects::work_item::WorkStatus::Failed,
                ReleaseOutcome::Failed(reason),
            );
            counters.failed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("crucible.pipeline.failed_total", "stage" => stage.as_str())
                .increment(1);
            push_audit(
                audit,
                &item.id,
                attempt_ts,
                stage,
                worker,
                "failed",
                Some(summary),
                details,
            );
        }
        Err(err) => {
            // Infrastructure failure: quota is not spent and the item goes
            // back to its entry status. Retry waits for the next cycle, so a
            // broken dependency cannot spin the worker loop.
            quota.release(stage);
            finish(coordinator, &item.id, stage.entry_status(), ReleaseOutcome::Plain);
            counters.retried.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("crucible.pipeline.retried_total", "stage" => stage.as_str())
                .increment(1);
            tracing::warn!(item_id = %item.id, stage = stage.as_str(), error = %err, "retrying");
            push_audit(
                audit,
                &item.id,
                attempt_ts,
                stage,
                worker,
                "retry",
                Some(err),
                serde_json::Value::Null,
            );
            return false;
        }
    }
    true
}

fn finish(
    coordinator: &ClaimCoordinator,
    id: &str,
    next: crucible_domain::value_objects::work_item::WorkStatus,
    outcome: ReleaseOutcome,
) {
    if let Err(err) = coordinator.release(id, next, outcome) {
        // The lease will recover the item; nothing else to do here.
        tracing::error!(item_id = %id, error = %err, "release failed");
    }
}

#[allow(clippy::too_many_arguments)]
fn push_audit(
    audit: &Mutex<Vec<AuditEvent>>,
    item_id: &str,
    attempt_ts: i64,
    stage: Stage,
    worker: &str,
    action: &str,
    error: Option<String>,
    details: serde_json::Value,
) {
    audit.lock().push(AuditEvent {
        item_id: item_id.to_string(),
        attempt_ts,
        stage: stage.as_str().to_string(),
        worker: Some(worker.to_string()),
        action: action.to_string(),
        error,
        details,
    });
}

#[cfg(test)]
mod tests {
    use super::{mode_for, ExecutionMode, ModeThresholds, PoolSizes, SchedulerControl};

    const THRESHOLDS: ModeThresholds = ModeThresholds {
        sequential_max: 50,
        concurrent_io_max: 100,
        multi_process_max: 500,
    };

    fn tier(mode: ExecutionMode) -> usize {
        match mode {
            ExecutionMode::Sequential => 0,
            ExecutionMode::ConcurrentIo => 1,
            ExecutionMode::MultiProcess => 2,
            ExecutionMode::Hybrid => 3,
        }
    }

    #[test]
    fn mode_for_matches_threshold_boundaries() {
        assert_eq!(mode_for(0, &THRESHOLDS), ExecutionMode::Sequential);
        assert_eq!(mode_for(50, &THRESHOLDS), ExecutionMode::Sequential);
        assert_eq!(mode_for(51, &THRESHOLDS), ExecutionMode::ConcurrentIo);
        assert_eq!(mode_for(100, &THRESHOLDS), ExecutionMode::ConcurrentIo);
        assert_eq!(mode_for(101, &THRESHOLDS), ExecutionMode::MultiProcess);
        assert_eq!(mode_for(500, &THRESHOLDS), ExecutionMode::MultiProcess);
        assert_eq!(mode_for(501, &THRESHOLDS), ExecutionMode::Hybrid);
    }

    #[test]
    fn mode_for_is_monotone_in_active_count() {
        let mut last = 0;
        for active in 0..=600 {
            let t = tier(mode_for(active, &THRESHOLDS));
            assert!(t >= last, "tier regressed at active={active}");
            last = t;
        }
    }

    #[test]
    fn pool_parallelism_never_drops_to_zero() {
        let pools = PoolSizes {
            sequential: 0,
            concurrent_io: 4,
            multi_process: 8,
            hybrid: 12,
        };
        assert_eq!(pools.parallelism(ExecutionMode::Sequential), 1);
        assert_eq!(pools.parallelism(ExecutionMode::Hybrid), 12);
    }

    #[test]
    fn control_flags_compose() {
        let control = SchedulerControl::default();
        assert!(!control.should_stop());
        control.halt();
        assert!(control.should_stop());
        control.clear_halt();
        assert!(!control.should_stop());
        control.request_cancel();
        assert!(control.should_stop());
    }
}
