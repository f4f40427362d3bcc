use crucible_domain::repositories::optimizer::WindowOptimizer;
use crucible_domain::services::{metrics, signal};
use crucible_domain::value_objects::bar::Bar;
use crucible_domain::value_objects::strategy_ir::StrategyIr;
use std::collections::BTreeMap;

/// Baseline stand-in for the external optimizer service: one coordinate pass
/// over a coarse multiplier grid around each parameter's declared default,
/// keeping the value that maximizes in-window expectancy. Deterministic, so
/// stability comparisons across windows measure the data, not the search.
pub struct GridSearchOptimizer {
    scales: Vec<f64>,
}

impl Default for GridSearchOptimizer {
    fn default() -> Self {
        Self {
            scales: vec![0.5, 0.75, 1.0, 1.25, 1.5],
        }
    }
}

impl GridSearchOptimizer {
    pub fn new(scales: Vec<f64>) -> Result<Self, String> {
        if scales.is_empty() {
            return Err("grid search needs at least one scale".to_string());
        }
        if scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("grid search scales must be finite and positive".to_string());
        }
        Ok(Self { scales })
    }
}

impl WindowOptimizer for GridSearchOptimizer {
    fn optimize(
        &self,
        ir: &StrategyIr,
        train_bars: &[Bar],
    ) -> Result<BTreeMap<String, f64>, String> {
        let mut best = ir.params.clone();
        if best.is_empty() {
            return Ok(best);
        }

        let names: Vec<String> = best.keys().cloned().collect();
        for name in &names {
            let default = ir.params[name];
            let mut best_value = best[name];
            let mut best_edge = f64::NEG_INFINITY;
            for scale in &self.scales {
                let mut candidate = best.clone();
                candidate.insert(name.clone(), default * scale);
                let outcomes = signal::run_signals(ir, train_bars, &candidate, "train")?;
                let edge = metrics::expectancy(&outcomes);
                if edge > best_edge {
                    best_edge = edge;
                    best_value = default * scale;
                }
            }
            best.insert(name.clone(), best_value);
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::GridSearchOptimizer;
    use crucible_domain::repositories::optimizer::WindowOptimizer;
    use crucible_domain::value_objects::bar::Bar;
    use crucible_domain::value_objects::strategy_ir::{
        Cmp, Expr, PriceField, Rule, StrategyIr,
    };
    use std::collections::BTreeMap;

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

    fn threshold_ir(default: f64) -> StrategyIr {
        StrategyIr {
            entry: Rule {
                lhs: Expr::Price {
                    field: PriceField::Close,
                },
                cmp: Cmp::Lt,
                rhs: Expr::Param {
                    name: "dip".to_string(),
                },
            },
            exit: Rule {
                lhs: Expr::Price {
                    field: PriceField::Close,
                },
                cmp: Cmp::Gt,
                rhs: Expr::Param {
                    name: "dip".to_string(),
                },
            },
            params: BTreeMap::from([("dip".to_string(), default)]),
        }
    }

    #[test]
    fn parameterless_strategy_returns_empty_set() {
        let ir = StrategyIr {
            params: BTreeMap::new(),
            ..threshold_ir(1.0)
        };
        let optimizer = GridSearchOptimizer::default();
        let params = optimizer.optimize(&ir, &bars(&[1.0, 2.0, 3.0])).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn optimizer_is_deterministic() {
        // Buy dips below the threshold, sell the recovery.
        let series = bars(&[10.0, 7.0, 11.0, 6.0, 12.0, 7.5, 11.5, 6.5, 12.5, 8.0, 13.0]);
        let ir = threshold_ir(8.0);
        let optimizer = GridSearchOptimizer::default();
        let first = optimizer.optimize(&ir, &series).unwrap();
        let second = optimizer.optimize(&ir, &series).unwrap();
        assert_eq!(first, second);
        assert!(first.contains_key("dip"));
    }

    #[test]
    fn new_rejects_degenerate_grids() {
        assert!(GridSearchOptimizer::new(vec![]).is_err());
        assert!(GridSearchOptimizer::new(vec![0.0]).is_err());
        assert!(GridSearchOptimizer::new(vec![f64::NAN]).is_err());
    }
}
