use crate::entities::metric_set::MetricSet;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkForwardConfig {
    pub windows: usize,
    pub train_pct: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            windows: 4,
            train_pct: 0.75,
        }
    }
}

/// One walk-forward window pair, inclusive bar indices. Train always precedes
/// and never overlaps its paired test window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowPair {
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

/// Splits `total` bars into `cfg.windows` consecutive, non-overlapping
/// (train, test) pairs in chronological order.
pub fn split_windows(total: usize, cfg: WalkForwardConfig) -> Result<Vec<WindowPair>, String> {
    if cfg.windows < 2 {
        return Err("walk-forward requires at least 2 windows".to_string());
    }
    if !(cfg.train_pct > 0.0 && cfg.train_pct < 1.0) {
        return Err("walk-forward train_pct must be in (0, 1)".to_string());
    }
    if total < cfg.windows * 2 {
        return Err(format!(
            "not enough bars for walk-forward: bars={total} windows={}",
            cfg.windows
        ));
    }

    let mut pairs = Vec::with_capacity(cfg.windows);
    for w in 0..cfg.windows {
        let start = w * total / cfg.windows;
        let end = (w + 1) * total / cfg.windows - 1;
        let len = end - start + 1;
        let train_len = ((len as f64 * cfg.train_pct) as usize).clamp(1, len - 1);
        pairs.push(WindowPair {
            train_start: start,
            train_end: start + train_len - 1,
            test_start: start + train_len,
            test_end: end,
        });
    }
    Ok(pairs)
}

/// Coefficient of variation: sample stdev over |mean|. All-zero values are
/// perfectly stable; a zero mean with nonzero spread is maximally unstable.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / (values.len() as f64 - 1.0);
    let std = var.sqrt();
    if std == 0.0 {
        return 0.0;
    }
    if mean == 0.0 {
        return f64::INFINITY;
    }
    std / mean.abs()
}

/// Per-parameter coefficient of variation across the optimizer's per-window
/// parameter sets. A parameter missing from any window, or one whose CV
/// exceeds `max_cv`, is an overfitting signal and rejects the strategy.
pub fn check_parameters(
    sets: &[BTreeMap<String, f64>],
    max_cv: f64,
) -> Result<BTreeMap<String, f64>, (String, f64)> {
    let mut cv_by_param = BTreeMap::new();
    let Some(first) = sets.first() else {
        return Ok(cv_by_param);
    };

    for param in first.keys() {
        let mut values = Vec::with_capacity(sets.len());
        for set in sets {
            match set.get(param) {
                Some(value) => values.push(*value),
                None => return Err((param.clone(), f64::INFINITY)),
            }
        }
        let cv = coefficient_of_variation(&values);
        if cv > max_cv {
            return Err((param.clone(), cv));
        }
        cv_by_param.insert(param.clone(), cv);
    }
    Ok(cv_by_param)
}

/// Aggregates per-window weighted metric sets into the single
/// walk-forward-stability figure forwarded to ranking: mean weighted Sharpe
/// discounted by its dispersion across windows.
pub fn walk_forward_stability(window_sets: &[MetricSet]) -> f64 {
    let sharpes: Vec<f64> = window_sets
        .iter()
        .map(|set| set.sharpe)
        .filter(|s| s.is_finite())
        .collect();
    if sharpes.is_empty() {
        return 0.0;
    }
    let mean = sharpes.iter().sum::<f64>() / sharpes.len() as f64;
    if sharpes.len() == 1 {
        return mean;
    }
    let var = sharpes
        .iter()
        .map(|s| {
            let diff = s - mean;
            diff * diff
        })
        .sum::<f64>()
        / (sharpes.len() as f64 - 1.0);
    mean / (1.0 + var.sqrt())
}
