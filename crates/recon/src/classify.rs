use std::collections::HashMap;

use kpi_engine::{eval_expr, parse, EvalError, EvalOptions, Expr};
use serde::Serialize;

use crate::config::ToleranceConfig;
use crate::error::CheckError;
use crate::model::{Entity, ValuePeriod};

/// Outcome of re-deriving one period's calculated value.
///
/// `expected` is what the formula yields from the stored inputs; `actual` is the
/// stored calculated value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconciliationResult {
    Consistent { expected: f64, actual: f64 },
    Mismatch { expected: f64, actual: f64, delta: f64 },
    /// Variables are declared but the period has no stored values at all.
    MissingInputs { entity: String, period: String },
    NoFormula,
}

/// Check one period with the default absolute tolerance and zero substitution.
pub fn check(entity: &Entity, period: &ValuePeriod) -> Result<ReconciliationResult, CheckError> {
    check_with(entity, period, &ToleranceConfig::default(), EvalOptions::default())
}

pub fn check_with(
    entity: &Entity,
    period: &ValuePeriod,
    tolerance: &ToleranceConfig,
    options: EvalOptions,
) -> Result<ReconciliationResult, CheckError> {
    let Some(formula) = entity.formula() else {
        return Ok(ReconciliationResult::NoFormula);
    };
    let parsed = parse(formula);
    check_parsed(entity, period, parsed.as_ref(), tolerance, options)
}

/// Same as [`check_with`] for a formula the caller already parsed. A parse
/// failure is reported only once the period is known to have inputs.
pub fn check_parsed(
    entity: &Entity,
    period: &ValuePeriod,
    parsed: Result<&Expr, &EvalError>,
    tolerance: &ToleranceConfig,
    options: EvalOptions,
) -> Result<ReconciliationResult, CheckError> {
    let values = values_by_code(entity, period)?;

    if values.is_empty() && !entity.variables.is_empty() {
        return Ok(ReconciliationResult::MissingInputs {
            entity: entity.key.clone(),
            period: period.id.clone(),
        });
    }

    let expr = parsed.map_err(|err| CheckError::Eval(err.clone()))?;
    let expected = eval_expr(expr, &values, options)?;
    let actual = period.calculated_value.unwrap_or(0.0);

    log::debug!(
        "{} / {}: expected={expected} actual={actual}",
        entity.key,
        period.id
    );

    if tolerance.within(expected, actual) {
        Ok(ReconciliationResult::Consistent { expected, actual })
    } else {
        Ok(ReconciliationResult::Mismatch {
            expected,
            actual,
            delta: (expected - actual).abs(),
        })
    }
}

/// Stored values for `period`, keyed by the owning variable's code.
///
/// Values pointing at an undeclared variable are skipped (lint reports them).
pub fn values_by_code(
    entity: &Entity,
    period: &ValuePeriod,
) -> Result<HashMap<String, f64>, CheckError> {
    let mut values = HashMap::with_capacity(period.values.len());

    for stored in &period.values {
        let Some(var) = entity.variable(&stored.variable_id) else {
            log::warn!(
                "{} / {}: value for undeclared variable id '{}' ignored",
                entity.key,
                period.id,
                stored.variable_id
            );
            continue;
        };
        if values.insert(var.code.clone(), stored.value).is_some() {
            return Err(CheckError::DuplicateValue {
                period: period.id.clone(),
                code: var.code.clone(),
            });
        }
    }

    Ok(values)
}
