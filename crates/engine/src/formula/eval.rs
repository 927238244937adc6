// Formula evaluator - evaluates parsed expressions against a variable mapping

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use serde::{Deserialize, Serialize};

use super::parser::{parse, Expr, Op};
use crate::error::EvalError;

/// Source of variable values, keyed by variable code.
pub trait VarLookup {
    fn value(&self, code: &str) -> Option<f64>;
}

impl<S: BuildHasher> VarLookup for HashMap<String, f64, S> {
    fn value(&self, code: &str) -> Option<f64> {
        self.get(code).copied()
    }
}

impl VarLookup for BTreeMap<String, f64> {
    fn value(&self, code: &str) -> Option<f64> {
        self.get(code).copied()
    }
}

impl<L: VarLookup + ?Sized> VarLookup for &L {
    fn value(&self, code: &str) -> Option<f64> {
        (**self).value(code)
    }
}

/// What to do when a formula references a code with no value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingVariablePolicy {
    /// Substitute `0`. Masks missing inputs, but matches how stored values were produced.
    #[default]
    Zero,
    /// Fail with `EvalError::UnknownVariable`.
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalOptions {
    pub missing: MissingVariablePolicy,
}

impl EvalOptions {
    pub fn strict() -> Self {
        Self { missing: MissingVariablePolicy::Error }
    }
}

/// Evaluate `formula` with unknown codes substituted as zero.
pub fn evaluate<L: VarLookup + ?Sized>(formula: &str, values: &L) -> Result<f64, EvalError> {
    evaluate_with(formula, values, EvalOptions::default())
}

pub fn evaluate_with<L: VarLookup + ?Sized>(
    formula: &str,
    values: &L,
    options: EvalOptions,
) -> Result<f64, EvalError> {
    let expr = parse(formula)?;
    eval_expr(&expr, values, options)
}

/// Evaluate an already-parsed expression. Lets callers parse a formula once and
/// evaluate it for many periods.
pub fn eval_expr<L: VarLookup + ?Sized>(
    expr: &Expr,
    values: &L,
    options: EvalOptions,
) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Var(code) => match (values.value(code), options.missing) {
            (Some(v), _) => Ok(v),
            (None, MissingVariablePolicy::Zero) => Ok(0.0),
            (None, MissingVariablePolicy::Error) => {
                Err(EvalError::UnknownVariable { code: code.clone() })
            }
        },
        Expr::Neg(inner) => Ok(-eval_expr(inner.as_ref(), values, options)?),
        Expr::BinaryOp { op, left, right } => {
            let l = eval_expr(left.as_ref(), values, options)?;
            let r = eval_expr(right.as_ref(), values, options)?;
            match op {
                Op::Add => Ok(l + r),
                Op::Sub => Ok(l - r),
                Op::Mul => Ok(l * r),
                Op::Div => {
                    // Covers -0.0 as well
                    if r == 0.0 {
                        Err(EvalError::DivideByZero)
                    } else {
                        Ok(l / r)
                    }
                }
            }
        }
    }
}
