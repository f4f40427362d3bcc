use crate::services::risk::RiskSnapshot;
use crate::value_objects::trade_outcome::TradeOutcome;

/// Execution collaborator boundary: realized outcomes for live monitoring and
/// the aggregate figures the risk gate evaluates.
pub trait ExecutionReporter: Send + Sync {
    fn live_outcomes(&self, strategy_id: &str) -> Result<Vec<TradeOutcome>, String>;

    fn risk_snapshot(&self) -> Result<RiskSnapshot, String>;
}
