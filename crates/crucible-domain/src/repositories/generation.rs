use crate::value_objects::strategy_ir::StrategyIr;
use serde::{Deserialize, Serialize};

/// One candidate produced by the generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStrategy {
    pub source: StrategyIr,
    pub kind: String,
    pub timeframe: String,
}

/// Generation service boundary. The core only ever pulls bounded batches.
pub trait GenerationClient: Send + Sync {
    fn next_batch(&self, limit: usize) -> Result<Vec<CandidateStrategy>, String>;
}
