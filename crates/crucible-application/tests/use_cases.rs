use crucible_application::config::SchedulerConfig;
use crucible_application::coordination::ClaimCoordinator;
use crucible_application::ingest;
use crucible_application::leaderboard::build_leaderboard;
use crucible_application::pipeline::{PipelinePorts, StageSettings};
use crucible_application::quota::QuotaGate;
use crucible_application::scheduler::{AdaptiveScheduler, SchedulerControl};
use crucible_domain::repositories::execution::ExecutionReporter;
use crucible_domain::repositories::generation::{CandidateStrategy, GenerationClient};
use crucible_domain::repositories::market_data::{BarRepository, BarsQuery};
use crucible_domain::repositories::work_items::WorkItemStore;
use crucible_domain::services::lookahead::ShuffleConfig;
use crucible_domain::services::risk::{RiskSnapshot, RiskThresholds, RiskVerdict};
use crucible_domain::services::stability::WalkForwardConfig;
use crucible_domain::value_objects::bar::Bar;
use crucible_domain::value_objects::strategy_ir::{
    Cmp, Expr, PriceField, RollingStat, Rule, StrategyIr,
};
use crucible_domain::value_objects::trade_outcome::TradeOutcome;
use crucible_domain::value_objects::work_item::{
    FailureReason, Stage, StrategyPayload, WorkItem, WorkStatus,
};
use crucible_infrastructure::optimizer::GridSearchOptimizer;
use crucible_infrastructure::persistence::memory::MemoryWorkItemStore;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

struct FakeBars {
    bars: Vec<Bar>,
}

impl BarRepository for FakeBars {
    fn load_bars(&self, _query: &BarsQuery) -> Result<Vec<Bar>, String> {
        Ok(self.bars.clone())
    }
}

struct FakeExecution {
    snapshot: RiskSnapshot,
}

impl FakeExecution {
    fn calm() -> Self {
        Self {
            snapshot: RiskSnapshot {
                drawdown_pct: 0.0,
                consecutive_losses: 0,
            },
        }
    }
}

impl ExecutionReporter for FakeExecution {
    fn live_outcomes(&self, _strategy_id: &str) -> Result<Vec<TradeOutcome>, String> {
        Ok(Vec::new())
    }

    fn risk_snapshot(&self) -> Result<RiskSnapshot, String> {
        Ok(self.snapshot)
    }
}

struct FakeGeneration {
    batches: Mutex<Vec<Vec<CandidateStrategy>>>,
}

impl GenerationClient for FakeGeneration {
    fn next_batch(&self, _limit: usize) -> Result<Vec<CandidateStrategy>, String> {
        Ok(self.batches.lock().pop().unwrap_or_default())
    }
}

fn bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(idx, close)| Bar {
            symbol: "BTCUSD".to_string(),
            timestamp: idx as i64 * 3600,
            open: *close,
            high: *close,
            low: *close,
            close: *close,
            volume: 1.0,
        })
        .collect()
}

fn rally_series() -> Vec<Bar> {
    let mut closes = Vec::new();
    let mut level = 100.0;
    for _ in 0..24 {
        for step in [-2.0, -3.0, -1.0, 2.0, 4.0, 5.0, 3.0, -4.0] {
            level += step;
            closes.push(level);
        }
        level += 4.0;
    }
    bars(&closes)
}

fn sma(window: usize) -> Expr {
    Expr::Rolling {
        window,
        center: false,
        stat: RollingStat::Mean,
        expr: Box::new(Expr::Price {
            field: PriceField::Close,
        }),
    }
}

fn sma_cross_ir() -> StrategyIr {
    StrategyIr {
        entry: Rule {
            lhs: sma(2),
            cmp: Cmp::CrossAbove,
            rhs: sma(5),
        },
        exit: Rule {
            lhs: sma(2),
            cmp: Cmp::CrossBelow,
            rhs: sma(5),
        },
        params: BTreeMap::new(),
    }
}

fn peeking_ir() -> StrategyIr {
    let mut ir = sma_cross_ir();
    ir.entry.lhs = Expr::Shift {
        offset: -1,
        expr: Box::new(Expr::Price {
            field: PriceField::Close,
        }),
    };
    ir
}

fn payload(ir: StrategyIr) -> StrategyPayload {
    StrategyPayload {
        source: ir,
        kind: "sma_cross".to_string(),
        timeframe: "1hour".to_string(),
    }
}

fn settings() -> StageSettings {
    StageSettings {
        symbol: "BTCUSD".to_string(),
        start_ts: None,
        end_ts: None,
        holdout_pct: 0.3,
        min_bars: 50,
        shuffle: ShuffleConfig {
            iterations: 30,
            significance: 0.5,
            seed: 11,
        },
        walk_forward: WalkForwardConfig {
            windows: 2,
            train_pct: 0.7,
        },
        max_param_cv: 0.5,
    }
}

fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        workers_sequential: 2,
        ..SchedulerConfig::default()
    }
}

fn build_scheduler(store: Arc<MemoryWorkItemStore>, quota: QuotaGate) -> AdaptiveScheduler {
    AdaptiveScheduler::new(
        ClaimCoordinator::new(store),
        quota,
        Arc::new(SchedulerControl::default()),
        &scheduler_config(),
        RiskThresholds::default(),
    )
}

#[test]
fn concurrent_claims_hand_one_item_to_exactly_one_worker() {
    let store = Arc::new(MemoryWorkItemStore::new());
    store
        .insert(WorkItem::new("only".to_string(), payload(sma_cross_ir()), 0))
        .unwrap();
    let coordinator = ClaimCoordinator::new(store);

    let winners: Vec<bool> = thread::scope(|scope| {
        let mut handles = Vec::new();
        for slot in 0..8 {
            let coordinator = coordinator.clone();
            handles.push(scope.spawn(move || {
                let worker = format!("worker-{slot}");
                coordinator
                    .claim_at(Stage::Validate, &worker, 100)
                    .unwrap()
                    .is_some()
            }));
        }
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(winners.iter().filter(|won| **won).count(), 1);
}

#[test]
fn stale_claim_is_reclaimable_only_after_the_lease() {
    let store = Arc::new(MemoryWorkItemStore::new());
    store
        .insert(WorkItem::new("a".to_string(), payload(sma_cross_ir()), 0))
        .unwrap();
    let coordinator = ClaimCoordinator::new(store.clone());

    coordinator
        .claim_at(Stage::Validate, "worker-0", 1_000)
        .unwrap()
        .unwrap();

    // Nobody else can see the item while the claim is live.
    assert!(coordinator
        .claim_at(Stage::Validate, "worker-1", 1_100)
        .unwrap()
        .is_none());

    assert!(coordinator.reclaim_stale_at(300, 1_300).unwrap().is_empty());
    let reclaimed = coordinator.reclaim_stale_at(300, 1_301).unwrap();
    assert_eq!(reclaimed, vec!["a".to_string()]);

    let again = coordinator
        .claim_at(Stage::Validate, "worker-1", 1_302)
        .unwrap();
    assert!(again.is_some());
    assert_eq!(store.get("a").unwrap().unwrap().owner.as_deref(), Some("worker-1"));
}

#[test]
fn scheduler_drives_items_from_new_to_scored() {
    let store = Arc::new(MemoryWorkItemStore::new());
    store
        .insert(WorkItem::new("good".to_string(), payload(sma_cross_ir()), 0))
        .unwrap();

    let series = rally_series();
    let fake_bars = FakeBars { bars: series };
    let optimizer = GridSearchOptimizer::default();
    let ports = PipelinePorts {
        bars: &fake_bars,
        optimizer: &optimizer,
    };
    let execution = FakeExecution::calm();
    let mut scheduler = build_scheduler(store.clone(), QuotaGate::new(0, 0));

    let mut scored = false;
    for _ in 0..4 {
        let report = scheduler.run_cycle(&ports, &settings(), &execution).unwrap();
        assert_eq!(report.verdict, RiskVerdict::Ok);
        if store.get("good").unwrap().unwrap().status == WorkStatus::Scored {
            scored = true;
            break;
        }
    }
    assert!(scored, "item should reach SCORED within a few cycles");

    let item = store.get("good").unwrap().unwrap();
    let weighted = item.weighted.expect("scored item carries weighted metrics");
    assert!(weighted.trade_count > 0);
    assert!(item.stability.is_some());
    assert_eq!(item.owner, None);

    let rows = build_leaderboard(store.as_ref(), 10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].item_id, "good");
}

#[test]
fn lookahead_and_syntax_failures_are_terminal_with_reasons() {
    let store = Arc::new(MemoryWorkItemStore::new());
    store
        .insert(WorkItem::new("peek".to_string(), payload(peeking_ir()), 0))
        .unwrap();
    let mut flat = payload(sma_cross_ir());
    flat.timeframe = "7min".to_string();
    store
        .insert(WorkItem::new("badtf".to_string(), flat, 0))
        .unwrap();
    store
        .insert(WorkItem::new(
            "quiet".to_string(),
            payload(sma_cross_ir()),
            0,
        ))
        .unwrap();

    // Flat series: the quiet strategy never trades.
    let fake_bars = FakeBars { bars: bars(&[100.0; 120]) };
    let optimizer = GridSearchOptimizer::default();
    let ports = PipelinePorts {
        bars: &fake_bars,
        optimizer: &optimizer,
    };
    let execution = FakeExecution::calm();
    let mut scheduler = build_scheduler(store.clone(), QuotaGate::new(0, 0));

    let report = scheduler.run_cycle(&ports, &settings(), &execution).unwrap();
    assert_eq!(report.failed, 3);
    assert_eq!(report.scored, 0);

    let peek = store.get("peek").unwrap().unwrap();
    assert_eq!(peek.status, WorkStatus::Failed);
    assert!(matches!(
        peek.failure,
        Some(FailureReason::LookaheadViolation { .. })
    ));

    let badtf = store.get("badtf").unwrap().unwrap();
    assert!(matches!(
        badtf.failure,
        Some(FailureReason::SyntaxInvalid { .. })
    ));

    let quiet = store.get("quiet").unwrap().unwrap();
    match quiet.failure {
        Some(FailureReason::EmpiricalLookahead { p_value, trades }) => {
            assert_eq!(trades, 0);
            assert_eq!(p_value, 1.0);
        }
        other => panic!("expected empirical lookahead failure, got {other:?}"),
    }

    // Failure reasons land in the audit trail too.
    assert_eq!(report.audit.len(), 3);
    assert!(report.audit.iter().all(|event| event.action == "failed"));
}

#[test]
fn infrastructure_errors_return_the_item_for_retry() {
    struct BrokenBars;
    impl BarRepository for BrokenBars {
        fn load_bars(&self, _query: &BarsQuery) -> Result<Vec<Bar>, String> {
            Err("store unreachable".to_string())
        }
    }

    let store = Arc::new(MemoryWorkItemStore::new());
    store
        .insert(WorkItem::new("a".to_string(), payload(sma_cross_ir()), 0))
        .unwrap();
    let optimizer = GridSearchOptimizer::default();
    let ports = PipelinePorts {
        bars: &BrokenBars,
        optimizer: &optimizer,
    };
    let execution = FakeExecution::calm();
    let mut scheduler = build_scheduler(store.clone(), QuotaGate::new(0, 0));

    let report = scheduler.run_cycle(&ports, &settings(), &execution).unwrap();
    assert!(report.retried >= 1);
    assert_eq!(report.failed, 0);

    let item = store.get("a").unwrap().unwrap();
    assert_eq!(item.status, WorkStatus::New);
    assert_eq!(item.owner, None);
    assert!(item.failure.is_none());
}

#[test]
fn halt_verdict_stops_claims_and_persists() {
    let store = Arc::new(MemoryWorkItemStore::new());
    store
        .insert(WorkItem::new("a".to_string(), payload(sma_cross_ir()), 0))
        .unwrap();

    let fake_bars = FakeBars { bars: rally_series() };
    let optimizer = GridSearchOptimizer::default();
    let ports = PipelinePorts {
        bars: &fake_bars,
        optimizer: &optimizer,
    };
    let mut scheduler = build_scheduler(store.clone(), QuotaGate::new(0, 0));
    let control = scheduler.control();

    let tripped = FakeExecution {
        snapshot: RiskSnapshot {
            drawdown_pct: 0.9,
            consecutive_losses: 0,
        },
    };
    let report = scheduler.run_cycle(&ports, &settings(), &tripped).unwrap();
    assert_eq!(report.verdict, RiskVerdict::Halt);
    assert_eq!(report.processed(), 0);
    assert!(control.halted());
    assert_eq!(store.get("a").unwrap().unwrap().status, WorkStatus::New);

    // The halt flag outlives the verdict that raised it.
    let calm = FakeExecution::calm();
    let report = scheduler.run_cycle(&ports, &settings(), &calm).unwrap();
    assert_eq!(report.processed(), 0);
    assert_eq!(store.get("a").unwrap().unwrap().status, WorkStatus::New);

    control.clear_halt();
    let report = scheduler.run_cycle(&ports, &settings(), &calm).unwrap();
    assert!(report.processed() > 0 || store.get("a").unwrap().unwrap().status != WorkStatus::New);
}

#[test]
fn quota_limits_how_much_a_cycle_processes() {
    let store = Arc::new(MemoryWorkItemStore::new());
    for id in ["a", "b", "c"] {
        let mut broken = payload(sma_cross_ir());
        broken.timeframe = "9min".to_string();
        store
            .insert(WorkItem::new(id.to_string(), broken, 0))
            .unwrap();
    }

    let fake_bars = FakeBars { bars: bars(&[100.0; 120]) };
    let optimizer = GridSearchOptimizer::default();
    let ports = PipelinePorts {
        bars: &fake_bars,
        optimizer: &optimizer,
    };
    let execution = FakeExecution::calm();
    let mut scheduler = build_scheduler(store.clone(), QuotaGate::new(1, 1));

    let report = scheduler.run_cycle(&ports, &settings(), &execution).unwrap();
    assert_eq!(report.failed, 1);
    assert!(report.quota_denied >= 1);

    let counts = store.status_counts().unwrap();
    assert_eq!(counts.get(&WorkStatus::New).copied().unwrap_or(0), 2);
    assert_eq!(counts.get(&WorkStatus::Failed).copied().unwrap_or(0), 1);
}

#[test]
fn promote_is_guarded_by_the_lifecycle() {
    let store = Arc::new(MemoryWorkItemStore::new());
    store
        .insert(WorkItem::new("a".to_string(), payload(sma_cross_ir()), 0))
        .unwrap();
    let coordinator = ClaimCoordinator::new(store.clone());

    // Not scored yet.
    assert!(coordinator
        .promote("a", WorkStatus::Selected)
        .unwrap_err()
        .contains("only scored items"));

    coordinator.claim_at(Stage::Validate, "w", 0).unwrap();
    coordinator
        .release(
            "a",
            WorkStatus::Scored,
            crucible_domain::repositories::work_items::ReleaseOutcome::Scored(
                crucible_domain::entities::metric_set::MetricSet::neutral(),
            ),
        )
        .unwrap();

    assert!(coordinator
        .promote("a", WorkStatus::Failed)
        .unwrap_err()
        .contains("promotion target"));
    coordinator.promote("a", WorkStatus::Selected).unwrap();
    assert_eq!(
        store.get("a").unwrap().unwrap().status,
        WorkStatus::Selected
    );

    // Promotion is not repeatable once the item left SCORED.
    assert!(coordinator.promote("a", WorkStatus::Retired).is_err());
}

#[test]
fn live_scoring_uses_the_same_expectancy_formula_as_offline() {
    struct LiveExecution;
    impl ExecutionReporter for LiveExecution {
        fn live_outcomes(&self, _strategy_id: &str) -> Result<Vec<TradeOutcome>, String> {
            Ok([5.0, 3.0, 4.0, -2.0, -1.0]
                .iter()
                .enumerate()
                .map(|(idx, ret)| TradeOutcome {
                    return_pct: *ret,
                    entry_ts: idx as i64 * 3600,
                    exit_ts: idx as i64 * 3600 + 1800,
                    timeframe: "1hour".to_string(),
                })
                .collect())
        }

        fn risk_snapshot(&self) -> Result<RiskSnapshot, String> {
            Ok(RiskSnapshot {
                drawdown_pct: 0.0,
                consecutive_losses: 0,
            })
        }
    }

    let store = Arc::new(MemoryWorkItemStore::new());
    store
        .insert(WorkItem::new("a".to_string(), payload(sma_cross_ir()), 0))
        .unwrap();
    let coordinator = ClaimCoordinator::new(store.clone());
    coordinator.claim_at(Stage::Validate, "w", 0).unwrap();
    coordinator
        .release(
            "a",
            WorkStatus::Scored,
            crucible_domain::repositories::work_items::ReleaseOutcome::Scored(
                crucible_domain::entities::metric_set::MetricSet::neutral(),
            ),
        )
        .unwrap();

    let live =
        crucible_application::monitoring::live_metric_sets(&LiveExecution, store.as_ref(), 10)
            .unwrap();
    assert_eq!(live.len(), 1);
    // winRate 0.6, meanWin 4%, meanLoss 1.5% => 0.6*4 - 0.4*1.5 = 1.8,
    // identical to what the offline engine computes for the same outcomes.
    assert!((live[0].live.expectancy - 1.8).abs() < 1e-12);
    let offline = crucible_domain::services::metrics::expectancy(
        &LiveExecution.live_outcomes("a").unwrap(),
    );
    assert_eq!(live[0].live.expectancy, offline);
}

#[test]
fn ingest_deduplicates_generated_candidates() {
    let candidate = CandidateStrategy {
        source: sma_cross_ir(),
        kind: "sma_cross".to_string(),
        timeframe: "1hour".to_string(),
    };
    let mut other = candidate.clone();
    other.timeframe = "4hour".to_string();

    let generation = FakeGeneration {
        batches: Mutex::new(vec![vec![candidate.clone(), candidate, other]]),
    };
    let store = MemoryWorkItemStore::new();

    let report = ingest::ingest_candidates(&generation, &store, 10).unwrap();
    assert_eq!(report.received, 3);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.duplicates, 1);
    assert_eq!(store.len(), 2);

    // A second pull with nothing new inserts nothing.
    let report = ingest::ingest_candidates(&generation, &store, 10).unwrap();
    assert_eq!(report.received, 0);
    assert_eq!(report.inserted, 0);
}
