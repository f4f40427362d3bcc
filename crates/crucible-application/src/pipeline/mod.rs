use crate::config::Config;
use crucible_domain::entities::metric_set::MetricSet;
use crucible_domain::repositories::market_data::{BarRepository, BarsQuery};
use crucible_domain::repositories::optimizer::WindowOptimizer;
use crucible_domain::services::lookahead::{self, ShuffleConfig};
use crucible_domain::services::{metrics as metrics_engine, signal, stability};
use crucible_domain::value_objects::bar::Bar;
use crucible_domain::value_objects::timeframe::Timeframe;
use crucible_domain::value_objects::work_item::{FailureReason, Stage, WorkItem};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info_span;

pub struct PipelinePorts<'a> {
    pub bars: &'a dyn BarRepository,
    pub optimizer: &'a dyn WindowOptimizer,
}

#[derive(Debug, Clone)]
pub struct StageSettings {
    pub symbol: String,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub holdout_pct: f64,
    pub min_bars: usize,
    pub shuffle: ShuffleConfig,
    pub walk_forward: stability::WalkForwardConfig,
    pub max_param_cv: f64,
}

impl StageSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            symbol: config.run.symbol.clone(),
            start_ts: config.data.start_ts,
            end_ts: config.data.end_ts,
            holdout_pct: config.data.holdout_pct,
            min_bars: config.data.min_bars,
            shuffle: ShuffleConfig {
                iterations: config.validation.shuffle_iterations,
                significance: config.validation.significance,
                seed: config.validation.seed,
            },
            walk_forward: stability::WalkForwardConfig {
                windows: config.stability.windows,
                train_pct: config.stability.train_pct,
            },
            max_param_cv: config.stability.max_param_cv,
        }
    }
}

/// What processing one claimed item produced. `Err(String)` from `process`
/// is an infrastructure failure: the item goes back to its entry status and
/// is retried; everything here is a real verdict.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Validated {
        stability: f64,
        details: serde_json::Value,
    },
    Scored {
        weighted: MetricSet,
        details: serde_json::Value,
    },
    Failed {
        reason: FailureReason,
    },
}

pub fn process(
    item: &WorkItem,
    stage: Stage,
    ports: &PipelinePorts,
    settings: &StageSettings,
) -> Result<StageOutcome, String> {
    match stage {
        Stage::Validate => validate(item, ports, settings),
        Stage::Score => score(item, ports, settings),
    }
}

fn validate(
    item: &WorkItem,
    ports: &PipelinePorts,
    settings: &StageSettings,
) -> Result<StageOutcome, String> {
    let _span = info_span!("validate_item", item_id = %item.id).entered();
    let stage_start = Instant::now();

    let ir = &item.payload.source;
    let timeframe = match Timeframe::parse(&item.payload.timeframe) {
        Ok(tf) => tf,
        Err(err) => {
            return Ok(StageOutcome::Failed {
                reason: FailureReason::SyntaxInvalid { reason: err },
            })
        }
    };
    if let Err(err) = ir.validate() {
        return Ok(StageOutcome::Failed {
            reason: FailureReason::SyntaxInvalid { reason: err },
        });
    }

    if let Some(violation) = lookahead::scan(ir) {
        return Ok(StageOutcome::Failed {
            reason: FailureReason::LookaheadViolation {
                construct: format!("{:?}", violation.kind),
                location: violation.location,
                reason: violation.reason,
            },
        });
    }

    let bars = load_series(item, ports, settings, &timeframe)?;
    let in_sample = in_sample_slice(&bars, settings.holdout_pct);

    let report = lookahead::shuffle_test(
        ir,
        in_sample,
        &BTreeMap::new(),
        &timeframe.label,
        settings.shuffle,
    )?;
    if !report.passed {
        return Ok(StageOutcome::Failed {
            reason: FailureReason::EmpiricalLookahead {
                p_value: report.p_value,
                trades: report.real_trades,
            },
        });
    }

    let pairs = stability::split_windows(in_sample.len(), settings.walk_forward)?;
    let mut param_sets = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        let train = &in_sample[pair.train_start..=pair.train_end];
        param_sets.push(ports.optimizer.optimize(ir, train)?);
    }

    let param_cv = match stability::check_parameters(&param_sets, settings.max_param_cv) {
        Ok(cv) => cv,
        Err((param, cv)) => {
            return Ok(StageOutcome::Failed {
                reason: FailureReason::UnstableParameters { param, cv },
            })
        }
    };

    let mut window_sets = Vec::with_capacity(pairs.len());
    for (pair, params) in pairs.iter().zip(&param_sets) {
        let train = &in_sample[pair.train_start..=pair.train_end];
        let test = &in_sample[pair.test_start..=pair.test_end];
        let train_set = metrics_engine::metric_set(
            &signal::run_signals(ir, train, params, &timeframe.label)?,
            timeframe.bars_per_day(),
            0.0,
        );
        let test_set = metrics_engine::metric_set(
            &signal::run_signals(ir, test, params, &timeframe.label)?,
            timeframe.bars_per_day(),
            0.0,
        );
        window_sets.push(metrics_engine::weighted(&train_set, &test_set));
    }
    let stability_value = stability::walk_forward_stability(&window_sets);

    metrics::histogram!("crucible.pipeline.validate_ms")
        .record(stage_start.elapsed().as_millis() as f64);

    Ok(StageOutcome::Validated {
        stability: stability_value,
        details: serde_json::json!({
            "p_value": report.p_value,
            "real_trades": report.real_trades,
            "real_expectancy": report.real_expectancy,
            "windows": pairs.len(),
            "param_cv": param_cv,
        }),
    })
}

fn score(
    item: &WorkItem,
    ports: &PipelinePorts,
    settings: &StageSettings,
) -> Result<StageOutcome, String> {
    let _span = info_span!("score_item", item_id = %item.id).entered();
    let stage_start = Instant::now();

    let ir = &item.payload.source;
    let timeframe = Timeframe::parse(&item.payload.timeframe)
        .map_err(|err| format!("scored item with unparseable timeframe: {err}"))?;

    let bars = load_series(item, ports, settings, &timeframe)?;
    let split = holdout_split(bars.len(), settings.holdout_pct);
    let train = &bars[..split];
    let holdout = &bars[split..];

    let params = ports.optimizer.optimize(ir, train)?;
    let train_outcomes = signal::run_signals(ir, train, &params, &timeframe.label)?;
    let holdout_outcomes = signal::run_signals(ir, holdout, &params, &timeframe.label)?;

    if train_outcomes.is_empty() && holdout_outcomes.is_empty() {
        return Ok(StageOutcome::Failed {
            reason: FailureReason::EmpiricalLookahead {
                p_value: 1.0,
                trades: 0,
            },
        });
    }

    let stability_value = item.stability.unwrap_or(0.0);
    let bars_per_day = timeframe.bars_per_day();
    let train_set = metrics_engine::metric_set(&train_outcomes, bars_per_day, stability_value);
    let holdout_set = metrics_engine::metric_set(&holdout_outcomes, bars_per_day, stability_value);
    let weighted = metrics_engine::weighted(&train_set, &holdout_set);

    metrics::histogram!("crucible.pipeline.score_ms")
        .record(stage_start.elapsed().as_millis() as f64);

    Ok(StageOutcome::Scored {
        weighted,
        details: serde_json::json!({
            "train": train_set,
            "holdout": holdout_set,
            "params": params,
            "train_bars": train.len(),
            "holdout_bars": holdout.len(),
        }),
    })
}

fn load_series(
    item: &WorkItem,
    ports: &PipelinePorts,
    settings: &StageSettings,
    timeframe: &Timeframe,
) -> Result<Vec<Bar>, String> {
    let load_start = Instant::now();
    let bars = ports.bars.load_bars(&BarsQuery {
        symbol: settings.symbol.clone(),
        timeframe: timeframe.label.clone(),
        start_ts: settings.start_ts,
        end_ts: settings.end_ts,
    })?;
    metrics::histogram!("crucible.pipeline.load_bars_ms")
        .record(load_start.elapsed().as_millis() as f64);

    if bars.len() < settings.min_bars {
        return Err(format!(
            "insufficient history for {}: bars={} min={}",
            item.payload.timeframe,
            bars.len(),
            settings.min_bars
        ));
    }
    Ok(bars)
}

/// Index of the first holdout bar: the chronological tail is reserved for
/// out-of-sample scoring.
fn holdout_split(total: usize, holdout_pct: f64) -> usize {
    if total < 2 {
        return total;
    }
    let holdout_len = ((total as f64) * holdout_pct).round() as usize;
    total - holdout_len.clamp(1, total - 1)
}

fn in_sample_slice(bars: &[Bar], holdout_pct: f64) -> &[Bar] {
    &bars[..holdout_split(bars.len(), holdout_pct)]
}
