use crate::value_objects::bar::Bar;
use crate::value_objects::strategy_ir::{BinaryOp, Cmp, Expr, PriceField, RollingStat, StrategyIr};
use crate::value_objects::trade_outcome::TradeOutcome;
use std::collections::BTreeMap;

/// Interprets a strategy over a bar series and returns the closed trades it
/// would have produced. Long-only, one position at a time, fills at the close
/// of the signal bar. Evaluation at index `i` only ever reads `bars[..=i]`;
/// a structurally future-reading node is an error, not a silent peek.
pub fn run_signals(
    ir: &StrategyIr,
    bars: &[Bar],
    overrides: &BTreeMap<String, f64>,
    timeframe: &str,
) -> Result<Vec<TradeOutcome>, String> {
    let mut params = ir.params.clone();
    for (name, value) in overrides {
        if !params.contains_key(name) {
            return Err(format!("override for undeclared param {name}"));
        }
        params.insert(name.clone(), *value);
    }

    let mut outcomes = Vec::new();
    let mut entry: Option<(i64, f64)> = None;

    for i in 0..bars.len() {
        match entry {
            None => {
                if rule_holds(&ir.entry, bars, &params, i)? {
                    let price = bars[i].close;
                    if price.is_finite() && price > 0.0 {
                        entry = Some((bars[i].timestamp, price));
                    }
                }
            }
            Some((entry_ts, entry_price)) => {
                if rule_holds(&ir.exit, bars, &params, i)? {
                    let exit_price = bars[i].close;
                    if exit_price.is_finite() && exit_price > 0.0 {
                        outcomes.push(TradeOutcome {
                            return_pct: (exit_price / entry_price - 1.0) * 100.0,
                            entry_ts,
                            exit_ts: bars[i].timestamp,
                            timeframe: timeframe.to_string(),
                        });
                    }
                    entry = None;
                }
            }
        }
    }

    // A position still open at the end of the series never closed; it is not
    // an outcome.
    Ok(outcomes)
}

fn rule_holds(
    rule: &crate::value_objects::strategy_ir::Rule,
    bars: &[Bar],
    params: &BTreeMap<String, f64>,
    i: usize,
) -> Result<bool, String> {
    let (Some(lhs), Some(rhs)) = (
        eval(&rule.lhs, bars, params, i)?,
        eval(&rule.rhs, bars, params, i)?,
    ) else {
        return Ok(false);
    };

    match rule.cmp {
        Cmp::Gt => Ok(lhs > rhs),
        Cmp::Lt => Ok(lhs < rhs),
        Cmp::Ge => Ok(lhs >= rhs),
        Cmp::Le => Ok(lhs <= rhs),
        Cmp::CrossAbove | Cmp::CrossBelow => {
            if i == 0 {
                return Ok(false);
            }
            let (Some(prev_lhs), Some(prev_rhs)) = (
                eval(&rule.lhs, bars, params, i - 1)?,
                eval(&rule.rhs, bars, params, i - 1)?,
            ) else {
                return Ok(false);
            };
            Ok(match rule.cmp {
                Cmp::CrossAbove => prev_lhs <= prev_rhs && lhs > rhs,
                _ => prev_lhs >= prev_rhs && lhs < rhs,
            })
        }
    }
}

/// `None` means "not yet available" (warmup of a window or shift); only
/// structural violations are errors.
fn eval(
    expr: &Expr,
    bars: &[Bar],
    params: &BTreeMap<String, f64>,
    i: usize,
) -> Result<Option<f64>, String> {
    match expr {
        Expr::Price { field } => Ok(Some(price_field(&bars[i], *field))),
        Expr::Const { value } => Ok(Some(*value)),
        Expr::Param { name } => params
            .get(name)
            .copied()
            .map(Some)
            .ok_or_else(|| format!("unbound param {name}")),
        Expr::Shift { offset, expr } => {
            if *offset < 0 {
                return Err("negative shift reads beyond now".to_string());
            }
            let offset = *offset as usize;
            if i < offset {
                return Ok(None);
            }
            eval(expr, bars, params, i - offset)
        }
        Expr::Rolling {
            window,
            center,
            stat,
            expr,
        } => {
            if *center {
                return Err("centered window reads beyond now".to_string());
            }
            if *window == 0 || i + 1 < *window {
                return Ok(None);
            }
            let mut values = Vec::with_capacity(*window);
            for j in (i + 1 - *window)..=i {
                match eval(expr, bars, params, j)? {
                    Some(value) => values.push(value),
                    None => return Ok(None),
                }
            }
            Ok(finite(rolling_stat(*stat, &values)))
        }
        Expr::At { ahead, expr } => {
            if *ahead > 0 {
                return Err("absolute index reads beyond now".to_string());
            }
            eval(expr, bars, params, i)
        }
        Expr::Binary { kind, lhs, rhs } => {
            let (Some(l), Some(r)) = (
                eval(lhs, bars, params, i)?,
                eval(rhs, bars, params, i)?,
            ) else {
                return Ok(None);
            };
            let value = match kind {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
            };
            Ok(finite(value))
        }
    }
}

fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

fn price_field(bar: &Bar, field: PriceField) -> f64 {
    match field {
        PriceField::Open => bar.open,
        PriceField::High => bar.high,
        PriceField::Low => bar.low,
        PriceField::Close => bar.close,
        PriceField::Volume => bar.volume,
    }
}

fn rolling_stat(stat: RollingStat, values: &[f64]) -> f64 {
    match stat {
        RollingStat::Mean => values.iter().sum::<f64>() / values.len() as f64,
        RollingStat::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        RollingStat::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        RollingStat::Std => {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let var = values
                .iter()
                .map(|v| {
                    let diff = v - mean;
                    diff * diff
                })
                .sum::<f64>()
                / values.len() as f64;
            var.sqrt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::strategy_ir::Rule;

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

    fn sma_cross(short: usize, long: usize) -> StrategyIr {
        StrategyIr {
            entry: Rule {
                lhs: sma(short),
                cmp: Cmp::CrossAbove,
                rhs: sma(long),
            },
            exit: Rule {
                lhs: sma(short),
                cmp: Cmp::CrossBelow,
                rhs: sma(long),
            },
            params: BTreeMap::new(),
        }
    }

    #[test]
    fn sma_cross_produces_a_closed_trade() {
        // Downtrend, recovery, then breakdown: one full entry/exit round trip.
        let series = bars(&[
            10.0, 9.0, 8.0, 7.0, 6.0, 7.0, 9.0, 11.0, 12.0, 11.0, 8.0, 6.0, 5.0, 4.0,
        ]);
        let outcomes =
            run_signals(&sma_cross(2, 4), &series, &BTreeMap::new(), "1hour").unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].entry_ts < outcomes[0].exit_ts);
        assert_eq!(outcomes[0].timeframe, "1hour");
    }

    #[test]
    fn flat_series_produces_no_trades() {
        let series = bars(&[5.0; 20]);
        let outcomes =
            run_signals(&sma_cross(2, 4), &series, &BTreeMap::new(), "1hour").unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn open_position_at_end_is_not_an_outcome() {
        // Crosses above near the end and never crosses back down.
        let series = bars(&[10.0, 9.0, 8.0, 7.0, 6.0, 7.0, 9.0, 11.0, 13.0]);
        let outcomes =
            run_signals(&sma_cross(2, 4), &series, &BTreeMap::new(), "1hour").unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn negative_shift_is_a_structural_error() {
        let mut ir = sma_cross(2, 4);
        ir.entry.lhs = Expr::Shift {
            offset: -1,
            expr: Box::new(Expr::Price {
                field: PriceField::Close,
            }),
        };
        let err = run_signals(&ir, &bars(&[1.0, 2.0, 3.0]), &BTreeMap::new(), "1hour")
            .unwrap_err();
        assert!(err.contains("beyond now"));
    }

    #[test]
    fn param_override_changes_signals() {
        let mut params = BTreeMap::new();
        params.insert("threshold".to_string(), 5.0);
        let ir = StrategyIr {
            entry: Rule {
                lhs: Expr::Price {
                    field: PriceField::Close,
                },
                cmp: Cmp::Gt,
                rhs: Expr::Param {
                    name: "threshold".to_string(),
                },
            },
            exit: Rule {
                lhs: Expr::Price {
                    field: PriceField::Close,
                },
                cmp: Cmp::Lt,
                rhs: Expr::Param {
                    name: "threshold".to_string(),
                },
            },
            params,
        };
        let series = bars(&[4.0, 6.0, 4.0, 6.0, 4.0]);

        let base = run_signals(&ir, &series, &BTreeMap::new(), "1hour").unwrap();
        assert_eq!(base.len(), 2);

        let mut overrides = BTreeMap::new();
        overrides.insert("threshold".to_string(), 100.0);
        let quiet = run_signals(&ir, &series, &overrides, "1hour").unwrap();
        assert!(quiet.is_empty());
    }

    #[test]
    fn override_for_undeclared_param_is_rejected() {
        let mut overrides = BTreeMap::new();
        overrides.insert("mystery".to_string(), 1.0);
        let err = run_signals(&sma_cross(2, 4), &bars(&[1.0, 2.0]), &overrides, "1hour")
            .unwrap_err();
        assert!(err.contains("undeclared param"));
    }
}
