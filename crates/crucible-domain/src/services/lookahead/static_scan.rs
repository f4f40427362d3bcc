use crate::value_objects::strategy_ir::{Expr, Rule, StrategyIr};
use serde::{Deserialize, Serialize};

/// Closed set of forbidden constructs. Each kind maps to a fixed reason in
/// the rule table below; detection is a visitor over the parsed strategy,
/// not string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    CenteredWindow,
    NegativeShift,
    FutureIndex,
}

const RULES: &[(ViolationKind, &str)] = &[
    (
        ViolationKind::CenteredWindow,
        "symmetric window includes bars after the decision point",
    ),
    (
        ViolationKind::NegativeShift,
        "negative shift reads a bar after the decision point",
    ),
    (
        ViolationKind::FutureIndex,
        "absolute index reads a bar after the decision point",
    ),
];

pub fn reason(kind: ViolationKind) -> &'static str {
    RULES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, reason)| *reason)
        .unwrap_or("forbidden construct")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Node path inside the strategy, e.g. `entry.lhs/rolling/shift`.
    pub location: String,
    pub reason: String,
}

/// Returns the first forbidden construct found, or `None` when clean.
pub fn scan(ir: &StrategyIr) -> Option<Violation> {
    scan_rule(&ir.entry, "entry").or_else(|| scan_rule(&ir.exit, "exit"))
}

fn scan_rule(rule: &Rule, path: &str) -> Option<Violation> {
    scan_expr(&rule.lhs, &format!("{path}.lhs"))
        .or_else(|| scan_expr(&rule.rhs, &format!("{path}.rhs")))
}

fn scan_expr(expr: &Expr, path: &str) -> Option<Violation> {
    match expr {
        Expr::Price { .. } | Expr::Const { .. } | Expr::Param { .. } => None,
        Expr::Shift { offset, expr } => {
            if *offset < 0 {
                return Some(violation(ViolationKind::NegativeShift, path, "shift"));
            }
            scan_expr(expr, &format!("{path}/shift"))
        }
        Expr::Rolling { center, expr, .. } => {
            if *center {
                return Some(violation(ViolationKind::CenteredWindow, path, "rolling"));
            }
            scan_expr(expr, &format!("{path}/rolling"))
        }
        Expr::At { ahead, expr } => {
            if *ahead > 0 {
                return Some(violation(ViolationKind::FutureIndex, path, "at"));
            }
            scan_expr(expr, &format!("{path}/at"))
        }
        Expr::Binary { lhs, rhs, .. } => scan_expr(lhs, &format!("{path}/binary.lhs"))
            .or_else(|| scan_expr(rhs, &format!("{path}/binary.rhs"))),
    }
}

fn violation(kind: ViolationKind, path: &str, node: &str) -> Violation {
    Violation {
        kind,
        location: format!("{path}/{node}"),
        reason: reason(kind).to_string(),
    }
}
