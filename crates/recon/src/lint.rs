//! Static checks over a snapshot: formula/variable drift and model invariants.

use std::collections::HashSet;

use kpi_engine::{parse, referenced_codes, strip_percent_scaling, unit_implies_percent};
use serde::Serialize;

use crate::model::{Entity, ModelIssue, Snapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum LintKind {
    /// Formula references a code no variable declares (always evaluates as 0).
    DanglingReference { code: String },
    /// Declared variable the formula never uses.
    UnusedVariable { code: String },
    UnparsableFormula { error: String },
    /// Percent unit with a formula that also multiplies by 100.
    RedundantPercentScaling { formula: String, suggested: String },
    Model(ModelIssue),
}

impl std::fmt::Display for LintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingReference { code } => {
                write!(f, "formula references undeclared variable '{code}'")
            }
            Self::UnusedVariable { code } => write!(f, "variable '{code}' is not used by the formula"),
            Self::UnparsableFormula { error } => write!(f, "formula does not parse: {error}"),
            Self::RedundantPercentScaling { formula, suggested } => {
                write!(f, "percent unit with scaled formula '{formula}' (suggest '{suggested}')")
            }
            Self::Model(issue) => write!(f, "{issue}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LintFinding {
    pub entity_key: String,
    #[serde(flatten)]
    pub kind: LintKind,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LintReport {
    pub entities: usize,
    pub findings: Vec<LintFinding>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

pub fn lint_snapshot(snapshot: &Snapshot, include_deleted: bool) -> LintReport {
    let mut report = LintReport::default();

    for entity in snapshot.entities.iter().filter(|e| include_deleted || !e.is_deleted()) {
        report.entities += 1;
        report.findings.extend(lint_entity(entity).into_iter().map(|kind| LintFinding {
            entity_key: entity.key.clone(),
            kind,
        }));
    }

    report
}

pub fn lint_entity(entity: &Entity) -> Vec<LintKind> {
    let mut findings = Vec::new();

    if let Some(formula) = entity.formula() {
        if let Err(err) = parse(formula) {
            findings.push(LintKind::UnparsableFormula { error: err.to_string() });
        }

        // Lexing may succeed where parsing failed; references are still useful then
        if let Ok(codes) = referenced_codes(formula) {
            let declared: HashSet<&str> = entity.variables.iter().map(|v| v.code.as_str()).collect();
            let used: HashSet<&str> = codes.iter().map(String::as_str).collect();

            for code in &codes {
                if !declared.contains(code.as_str()) {
                    findings.push(LintKind::DanglingReference { code: code.clone() });
                }
            }
            for var in &entity.variables {
                if !used.contains(var.code.as_str()) {
                    findings.push(LintKind::UnusedVariable { code: var.code.clone() });
                }
            }
        }

        if entity.unit.as_deref().is_some_and(unit_implies_percent) {
            let suggested = strip_percent_scaling(formula);
            if suggested != formula {
                findings.push(LintKind::RedundantPercentScaling {
                    formula: formula.to_string(),
                    suggested,
                });
            }
        }
    }

    findings.extend(entity.validate().into_iter().map(LintKind::Model));
    findings
}
