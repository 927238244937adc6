//! One-time data fix: drop `* 100` from formulas whose unit is already a percentage.
//!
//! Works on the serialized collection as loose JSON so every field it does not
//! touch (including ones this crate has no model for) is written back unchanged.

use kpi_engine::{strip_percent_scaling, unit_implies_percent};
use serde::Serialize;
use serde_json::Value;

use crate::error::ReconError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationChange {
    pub key: String,
    pub unit: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub examined: usize,
    pub changed: Vec<MigrationChange>,
}

/// Rewritten formula, or `None` when nothing changes for this unit.
pub fn migrate_formula(formula: &str, unit: Option<&str>) -> Option<String> {
    if !unit.is_some_and(unit_implies_percent) {
        return None;
    }
    let rewritten = strip_percent_scaling(formula);
    (rewritten != formula).then_some(rewritten)
}

/// Apply the rewrite in place to a JSON array of entity objects, or to an
/// object holding one under `entities`.
pub fn migrate_collection(doc: &mut Value) -> Result<MigrationReport, ReconError> {
    let items = match doc {
        Value::Array(items) => items,
        Value::Object(map) => match map.get_mut("entities") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ReconError::MigrationInput(
                    "expected an array of entities or an object with an \"entities\" array".into(),
                ))
            }
        },
        _ => {
            return Err(ReconError::MigrationInput(
                "expected an array of entities or an object with an \"entities\" array".into(),
            ))
        }
    };

    let mut report = MigrationReport::default();

    for (index, item) in items.iter_mut().enumerate() {
        let Value::Object(obj) = item else {
            log::warn!("entry #{index} is not an object, left as is");
            continue;
        };
        report.examined += 1;

        let key = match obj.get("key").or_else(|| obj.get("id")) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("#{index}"),
        };
        let Some(formula) = obj.get("formula").and_then(Value::as_str) else {
            continue;
        };
        let unit = obj.get("unit").and_then(Value::as_str);

        if let Some(after) = migrate_formula(formula, unit) {
            log::debug!("{key}: '{formula}' -> '{after}'");
            report.changed.push(MigrationChange {
                key,
                unit: unit.unwrap_or_default().to_string(),
                before: formula.to_string(),
                after: after.clone(),
            });
            obj.insert("formula".to_string(), Value::String(after));
        }
    }

    Ok(report)
}
