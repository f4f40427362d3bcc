use serde::{Deserialize, Serialize};

/// Aggregate live figures reported by the execution collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub drawdown_pct: f64,
    pub consecutive_losses: u32,
}

/// A limit of zero disables that check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub pause_drawdown_pct: f64,
    pub halt_drawdown_pct: f64,
    pub pause_consecutive_losses: u32,
    pub halt_consecutive_losses: u32,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            pause_drawdown_pct: 0.15,
            halt_drawdown_pct: 0.30,
            pause_consecutive_losses: 5,
            halt_consecutive_losses: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskVerdict {
    Ok,
    Pause,
    Halt,
}

/// Stateless circuit breaker. Halt instructs the scheduler to stop issuing
/// claims and cancel schedulable work; it never preempts an in-flight claim.
pub fn evaluate(snapshot: RiskSnapshot, thresholds: &RiskThresholds) -> RiskVerdict {
    let dd = snapshot.drawdown_pct;
    let losses = snapshot.consecutive_losses;

    if breaches(dd, thresholds.halt_drawdown_pct)
        || breaches_count(losses, thresholds.halt_consecutive_losses)
    {
        return RiskVerdict::Halt;
    }
    if breaches(dd, thresholds.pause_drawdown_pct)
        || breaches_count(losses, thresholds.pause_consecutive_losses)
    {
        return RiskVerdict::Pause;
    }
    RiskVerdict::Ok
}

fn breaches(value: f64, limit: f64) -> bool {
    limit > 0.0 && value.is_finite() && value >= limit
}

fn breaches_count(value: u32, limit: u32) -> bool {
    limit > 0 && value >= limit
}
