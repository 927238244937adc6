//! `kpi-engine`: arithmetic formula engine for KPI definitions.
//!
//! Formulas reference variable codes as bare identifiers and are restricted to
//! numbers, `+ - * /`, unary signs and parentheses. Nothing else is executed.

pub mod error;
pub mod formula;

pub use error::EvalError;
pub use formula::eval::{
    eval_expr, evaluate, evaluate_with, EvalOptions, MissingVariablePolicy, VarLookup,
};
pub use formula::parser::{format_expr, parse, Expr, Op, MAX_DEPTH};
pub use formula::refs::{referenced_codes, unresolved_codes};
pub use formula::rewrite::{strip_percent_scaling, unit_implies_percent};
