use crate::services::metrics;
use crate::services::signal;
use crate::value_objects::bar::Bar;
use crate::value_objects::strategy_ir::StrategyIr;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShuffleConfig {
    pub iterations: u32,
    pub significance: f64,
    pub seed: u64,
}

impl Default for ShuffleConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            significance: 0.05,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShuffleReport {
    pub real_expectancy: f64,
    pub real_trades: usize,
    /// Fraction of shuffled runs whose edge met or exceeded the real edge.
    pub p_value: f64,
    pub passed: bool,
}

/// Permutation test for empirical lookahead. Shuffling the bar order destroys
/// causal structure; an edge that survives shuffling is an artifact of
/// whatever the strategy opportunistically reacts to, not of ordering, so the
/// strategy only passes when the real edge is rare under permutation
/// (`p_value < significance`). Iteration `i` seeds its own rng with
/// `seed + i`, so the whole test is reproducible for a fixed seed.
pub fn shuffle_test(
    ir: &StrategyIr,
    bars: &[Bar],
    params: &BTreeMap<String, f64>,
    timeframe: &str,
    cfg: ShuffleConfig,
) -> Result<ShuffleReport, String> {
    let real = signal::run_signals(ir, bars, params, timeframe)?;
    let real_expectancy = metrics::expectancy(&real);

    // No trades on the real series means there is no edge to validate.
    if real.is_empty() {
        return Ok(ShuffleReport {
            real_expectancy,
            real_trades: 0,
            p_value: 1.0,
            passed: false,
        });
    }
    if cfg.iterations == 0 {
        return Err("shuffle test requires at least one iteration".to_string());
    }

    let timestamps: Vec<i64> = bars.iter().map(|bar| bar.timestamp).collect();
    let mut at_or_above = 0u32;

    for iteration in 0..cfg.iterations {
        let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(iteration as u64));
        let mut shuffled = bars.to_vec();
        shuffled.shuffle(&mut rng);
        // Keep the time axis fixed: permute prices, not timestamps.
        for (bar, ts) in shuffled.iter_mut().zip(&timestamps) {
            bar.timestamp = *ts;
        }

        let outcomes = signal::run_signals(ir, &shuffled, params, timeframe)?;
        if metrics::expectancy(&outcomes) >= real_expectancy {
            at_or_above += 1;
        }
    }

    let p_value = at_or_above as f64 / cfg.iterations as f64;
    Ok(ShuffleReport {
        real_expectancy,
        real_trades: real.len(),
        p_value,
        passed: p_value < cfg.significance,
    })
}
