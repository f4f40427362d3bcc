use crate::value_objects::bar::Bar;
use crate::value_objects::strategy_ir::StrategyIr;
use std::collections::BTreeMap;

/// External parameter optimizer. Given a strategy and a train window it
/// returns one parameter set; the stability checker compares these across
/// walk-forward windows.
pub trait WindowOptimizer: Send + Sync {
    fn optimize(&self, ir: &StrategyIr, train_bars: &[Bar])
        -> Result<BTreeMap<String, f64>, String>;
}
