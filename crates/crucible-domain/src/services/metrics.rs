use crate::entities::metric_set::MetricSet;
use crate::value_objects::trade_outcome::TradeOutcome;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Blend weights for train vs holdout metrics. Holdout is weighted higher to
/// penalize overfitting to the training window while still rewarding
/// strategies that also perform in-sample. These are part of the metric
/// definition, not tunables.
pub const WEIGHT_TRAIN: f64 = 0.4;
pub const WEIGHT_HOLDOUT: f64 = 0.6;

/// Probability-weighted average return per trade:
/// `win_rate * mean_win - (1 - win_rate) * mean_loss`, with `mean_loss` as a
/// magnitude. The offline scorer and the live monitor both call this exact
/// function; there is no second formula. Returns 0.0 on empty input.
pub fn expectancy(outcomes: &[TradeOutcome]) -> f64 {
    let returns = finite_returns(outcomes);
    if returns.is_empty() {
        return 0.0;
    }

    let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();

    let win_rate = wins.len() as f64 / returns.len() as f64;
    let mean_win = mean(&wins);
    let mean_loss = mean(&losses).abs();

    win_rate * mean_win - (1.0 - win_rate) * mean_loss
}

pub fn win_rate(outcomes: &[TradeOutcome]) -> f64 {
    let returns = finite_returns(outcomes);
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
}

/// Annualized Sharpe: `mean / stdev * sqrt(252 * bars_per_day)`. The
/// annualization factor always scales with bar density so strategies on
/// different resolutions are comparable. Returns 0.0 for fewer than two
/// usable outcomes or zero variance.
pub fn sharpe(outcomes: &[TradeOutcome], bars_per_day: f64) -> f64 {
    let returns = finite_returns(outcomes);
    if returns.len() < 2 {
        return 0.0;
    }

    let mean_ret = mean(&returns);
    let var = returns
        .iter()
        .map(|ret| {
            let diff = ret - mean_ret;
            diff * diff
        })
        .sum::<f64>()
        / (returns.len() as f64 - 1.0);
    let std = var.sqrt();
    if std == 0.0 || !std.is_finite() {
        return 0.0;
    }

    mean_ret / std * annualization_factor(bars_per_day)
}

pub fn annualization_factor(bars_per_day: f64) -> f64 {
    (TRADING_DAYS_PER_YEAR * bars_per_day).sqrt()
}

/// Full metric set for one window of outcomes.
pub fn metric_set(outcomes: &[TradeOutcome], bars_per_day: f64, stability: f64) -> MetricSet {
    let returns = finite_returns(outcomes);
    MetricSet {
        sharpe: sharpe(outcomes, bars_per_day),
        expectancy: expectancy(outcomes),
        win_rate: win_rate(outcomes),
        trade_count: returns.len(),
        stability: if stability.is_finite() { stability } else { 0.0 },
    }
}

/// Fixed linear blend of train and holdout sets; every field is
/// `0.4 * train + 0.6 * holdout`. The result is the only metric set the
/// ranking stage may consume.
pub fn weighted(train: &MetricSet, holdout: &MetricSet) -> MetricSet {
    MetricSet {
        sharpe: blend(train.sharpe, holdout.sharpe),
        expectancy: blend(train.expectancy, holdout.expectancy),
        win_rate: blend(train.win_rate, holdout.win_rate),
        trade_count: blend(train.trade_count as f64, holdout.trade_count as f64).round() as usize,
        stability: blend(train.stability, holdout.stability),
    }
}

fn blend(train: f64, holdout: f64) -> f64 {
    let t = if train.is_finite() { train } else { 0.0 };
    let h = if holdout.is_finite() { holdout } else { 0.0 };
    WEIGHT_TRAIN * t + WEIGHT_HOLDOUT * h
}

fn finite_returns(outcomes: &[TradeOutcome]) -> Vec<f64> {
    outcomes
        .iter()
        .map(|o| o.return_pct)
        .filter(|r| r.is_finite())
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
