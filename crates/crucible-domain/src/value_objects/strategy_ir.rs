use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Interchange representation of a generated strategy. The generation service
/// ships this as JSON; the lookahead scanner walks it and the signal evaluator
/// interprets it. It is deliberately not a language: entry/exit are single
/// comparison rules over expression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyIr {
    pub entry: Rule,
    pub exit: Rule,
    /// Tunable parameters referenced by `Expr::Param` nodes, with defaults.
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub lhs: Expr,
    pub cmp: Cmp,
    pub rhs: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cmp {
    Gt,
    Lt,
    Ge,
    Le,
    CrossAbove,
    CrossBelow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollingStat {
    Mean,
    Min,
    Max,
    Std,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    /// Price field of the bar under evaluation.
    Price { field: PriceField },
    Const { value: f64 },
    Param { name: String },
    /// Value of `expr` shifted `offset` bars into the past. Negative offsets
    /// read the future and are rejected by the lookahead scanner.
    Shift { offset: i64, expr: Box<Expr> },
    /// Rolling statistic over the trailing `window` bars ending at "now".
    /// `center = true` makes the window symmetric around "now", which peeks
    /// forward and is rejected by the lookahead scanner.
    Rolling {
        window: usize,
        #[serde(default)]
        center: bool,
        stat: RollingStat,
        expr: Box<Expr>,
    },
    /// Value of `expr` at an absolute index `ahead` bars beyond "now".
    /// Any `ahead > 0` is a future read.
    At { ahead: usize, expr: Box<Expr> },
    Binary {
        kind: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl StrategyIr {
    /// Structural validity: rejects windows of zero bars, references to
    /// undeclared parameters, and non-finite constants. Anything failing here
    /// is SyntaxInvalid before any market data is touched.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in &self.params {
            if !value.is_finite() {
                return Err(format!("param {name} has non-finite default"));
            }
        }
        validate_expr(&self.entry.lhs, &self.params)?;
        validate_expr(&self.entry.rhs, &self.params)?;
        validate_expr(&self.exit.lhs, &self.params)?;
        validate_expr(&self.exit.rhs, &self.params)?;
        Ok(())
    }

    /// Canonical JSON used for fingerprinting. Field order is fixed by the
    /// struct definitions and `params` is a BTreeMap, so equal strategies
    /// serialize identically.
    pub fn canonical_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|err| format!("failed to serialize strategy: {err}"))
    }
}

fn validate_expr(expr: &Expr, params: &BTreeMap<String, f64>) -> Result<(), String> {
    match expr {
        Expr::Price { .. } => Ok(()),
        Expr::Const { value } => {
            if value.is_finite() {
                Ok(())
            } else {
                Err("non-finite constant".to_string())
            }
        }
        Expr::Param { name } => {
            if params.contains_key(name) {
                Ok(())
            } else {
                Err(format!("reference to undeclared param {name}"))
            }
        }
        Expr::Shift { expr, .. } => validate_expr(expr, params),
        Expr::Rolling { window, expr, .. } => {
            if *window == 0 {
                return Err("rolling window of 0 bars".to_string());
            }
            validate_expr(expr, params)
        }
        Expr::At { expr, .. } => validate_expr(expr, params),
        Expr::Binary { lhs, rhs, .. } => {
            validate_expr(lhs, params)?;
            validate_expr(rhs, params)
        }
    }
}
