use crate::entities::metric_set::MetricSet;
use crate::value_objects::strategy_ir::StrategyIr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    New,
    Claimed,
    Validated,
    Scored,
    Selected,
    Failed,
    Retired,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::New => "new",
            WorkStatus::Claimed => "claimed",
            WorkStatus::Validated => "validated",
            WorkStatus::Scored => "scored",
            WorkStatus::Selected => "selected",
            WorkStatus::Failed => "failed",
            WorkStatus::Retired => "retired",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "new" => Ok(WorkStatus::New),
            "claimed" => Ok(WorkStatus::Claimed),
            "validated" => Ok(WorkStatus::Validated),
            "scored" => Ok(WorkStatus::Scored),
            "selected" => Ok(WorkStatus::Selected),
            "failed" => Ok(WorkStatus::Failed),
            "retired" => Ok(WorkStatus::Retired),
            _ => Err(format!("unknown work status: {value}")),
        }
    }

    /// Terminal statuses are immutable once set, except for explicit archival.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkStatus::Failed | WorkStatus::Retired)
    }
}

/// Pipeline stages a worker can claim from. Each stage drains exactly one
/// entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validate,
    Score,
}

impl Stage {
    pub fn entry_status(&self) -> WorkStatus {
        match self {
            Stage::Validate => WorkStatus::New,
            Stage::Score => WorkStatus::Validated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Score => "score",
        }
    }
}

/// Why a strategy was terminally failed. Recorded on the item and in the
/// audit trail; never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    SyntaxInvalid {
        reason: String,
    },
    LookaheadViolation {
        construct: String,
        location: String,
        reason: String,
    },
    EmpiricalLookahead {
        p_value: f64,
        trades: usize,
    },
    UnstableParameters {
        param: String,
        cv: f64,
    },
}

impl FailureReason {
    pub fn summary(&self) -> String {
        match self {
            FailureReason::SyntaxInvalid { reason } => format!("syntax invalid: {reason}"),
            FailureReason::LookaheadViolation {
                construct,
                location,
                ..
            } => format!("lookahead violation: {construct} at {location}"),
            FailureReason::EmpiricalLookahead { p_value, trades } => {
                format!("empirical lookahead: p={p_value:.3} trades={trades}")
            }
            FailureReason::UnstableParameters { param, cv } => {
                format!("unstable parameter {param}: cv={cv:.3}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPayload {
    pub source: StrategyIr,
    pub kind: String,
    pub timeframe: String,
}

/// One unit of pipeline work. `owner` is set iff `status == Claimed`; a
/// claimed item whose lease has elapsed is eligible for reclaim by any worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub payload: StrategyPayload,
    pub status: WorkStatus,
    pub owner: Option<String>,
    pub claimed_at: Option<i64>,
    /// Status the item was claimed out of; stale reclaim returns it there.
    pub claimed_from: Option<WorkStatus>,
    pub created_at: i64,
    pub failure: Option<FailureReason>,
    /// Walk-forward stability, recorded when validation passes.
    pub stability: Option<f64>,
    /// Weighted train/holdout metrics, present once scored. The only metric
    /// set the ranking stage may consume.
    pub weighted: Option<MetricSet>,
}

impl WorkItem {
    pub fn new(id: String, payload: StrategyPayload, created_at: i64) -> Self {
        Self {
            id,
            payload,
            status: WorkStatus::New,
            owner: None,
            claimed_at: None,
            claimed_from: None,
            created_at,
            failure: None,
            stability: None,
            weighted: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Stage, WorkStatus};

    #[test]
    fn stage_entry_statuses() {
        assert_eq!(Stage::Validate.entry_status(), WorkStatus::New);
        assert_eq!(Stage::Score.entry_status(), WorkStatus::Validated);
    }

    #[test]
    fn terminal_statuses() {
        assert!(WorkStatus::Failed.is_terminal());
        assert!(WorkStatus::Retired.is_terminal());
        assert!(!WorkStatus::Scored.is_terminal());
        assert!(!WorkStatus::Claimed.is_terminal());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            WorkStatus::New,
            WorkStatus::Claimed,
            WorkStatus::Validated,
            WorkStatus::Scored,
            WorkStatus::Selected,
            WorkStatus::Failed,
            WorkStatus::Retired,
        ] {
            assert_eq!(WorkStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(WorkStatus::parse("nope").is_err());
    }
}
