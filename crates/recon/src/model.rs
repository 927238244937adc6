use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::ReconciliationResult;
use crate::error::{CheckError, ReconError};

// ---------------------------------------------------------------------------
// Input snapshot
// ---------------------------------------------------------------------------

/// A measurable business object (KPI or initiative).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub baseline: Option<f64>,
    #[serde(default)]
    pub target: Option<f64>,
    #[serde(default)]
    pub direction: Direction,
    /// Tombstone. Deleted entities stay in snapshots but are skipped by default.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub variables: Vec<EntityVariable>,
    #[serde(default)]
    pub periods: Vec<ValuePeriod>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    HigherIsBetter,
    LowerIsBetter,
}

/// A named input slot. `code` is the token the formula refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityVariable {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Numeric,
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableValue {
    pub variable_id: String,
    pub value: f64,
}

/// A reporting interval over `[start, end)`. Periods sharing a boundary do not overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuePeriod {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub status: PeriodStatus,
    #[serde(default)]
    pub calculated_value: Option<f64>,
    #[serde(default)]
    pub final_value: Option<f64>,
    #[serde(default)]
    pub achievement_value: Option<f64>,
    #[serde(default)]
    pub values: Vec<VariableValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    #[default]
    Draft,
    Final,
}

/// Pre-fetched, immutable view of the entities to check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub entities: Vec<Entity>,
}

impl Snapshot {
    /// Accepts `{"entities": [...]}` or a bare array of entities.
    pub fn from_json(input: &str) -> Result<Self, ReconError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Wrapped(Snapshot),
            Bare(Vec<Entity>),
        }

        match serde_json::from_str::<Shape>(input) {
            Ok(Shape::Wrapped(snapshot)) => Ok(snapshot),
            Ok(Shape::Bare(entities)) => Ok(Snapshot { entities }),
            // Untagged errors are uninformative; re-run the primary shape for a real message
            Err(_) => serde_json::from_str::<Snapshot>(input)
                .map_err(|e| ReconError::SnapshotParse(e.to_string())),
        }
    }
}

impl Entity {
    /// The formula, if present and not blank.
    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn variable(&self, id: &str) -> Option<&EntityVariable> {
        self.variables.iter().find(|v| v.id == id)
    }

    /// Structural problems in this entity's declared data.
    pub fn validate(&self) -> Vec<ModelIssue> {
        let mut issues = Vec::new();

        let mut codes = HashSet::new();
        for var in &self.variables {
            if !codes.insert(var.code.as_str()) {
                issues.push(ModelIssue::DuplicateCode { code: var.code.clone() });
            }
        }

        let ids: HashMap<&str, &str> = self
            .variables
            .iter()
            .map(|v| (v.id.as_str(), v.code.as_str()))
            .collect();

        for period in &self.periods {
            if period.end < period.start {
                issues.push(ModelIssue::InvertedPeriod { period: period.id.clone() });
            }

            let mut seen = HashSet::new();
            for value in &period.values {
                match ids.get(value.variable_id.as_str()) {
                    Some(code) => {
                        if !seen.insert(value.variable_id.as_str()) {
                            issues.push(ModelIssue::DuplicateValue {
                                period: period.id.clone(),
                                code: code.to_string(),
                            });
                        }
                    }
                    None => issues.push(ModelIssue::UnknownVariable {
                        period: period.id.clone(),
                        variable_id: value.variable_id.clone(),
                    }),
                }
            }
        }

        let finals: Vec<&ValuePeriod> = self
            .periods
            .iter()
            .filter(|p| p.status == PeriodStatus::Final)
            .collect();
        for (i, a) in finals.iter().enumerate() {
            for b in &finals[i + 1..] {
                if a.start < b.end && b.start < a.end {
                    issues.push(ModelIssue::OverlappingFinalPeriods {
                        first: a.id.clone(),
                        second: b.id.clone(),
                    });
                }
            }
        }

        issues
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ModelIssue {
    DuplicateCode { code: String },
    DuplicateValue { period: String, code: String },
    UnknownVariable { period: String, variable_id: String },
    OverlappingFinalPeriods { first: String, second: String },
    InvertedPeriod { period: String },
}

impl std::fmt::Display for ModelIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateCode { code } => write!(f, "variable code '{code}' declared twice"),
            Self::DuplicateValue { period, code } => {
                write!(f, "period '{period}': more than one value for '{code}'")
            }
            Self::UnknownVariable { period, variable_id } => {
                write!(f, "period '{period}': value for undeclared variable id '{variable_id}'")
            }
            Self::OverlappingFinalPeriods { first, second } => {
                write!(f, "final periods '{first}' and '{second}' overlap")
            }
            Self::InvertedPeriod { period } => write!(f, "period '{period}' ends before it starts"),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch rows
// ---------------------------------------------------------------------------

/// Report view of one checked (entity, period) pair. `Errored` sits alongside
/// the four reconciliation outcomes so one bad formula never stops a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Consistent { expected: f64, actual: f64 },
    Mismatch { expected: f64, actual: f64, delta: f64 },
    MissingInputs,
    NoFormula,
    Errored { error_kind: String, error: String },
}

impl RowOutcome {
    pub fn bucket(&self) -> Bucket {
        match self {
            Self::Consistent { .. } => Bucket::Consistent,
            Self::Mismatch { .. } => Bucket::Mismatch,
            Self::MissingInputs => Bucket::MissingInputs,
            Self::NoFormula => Bucket::NoFormula,
            Self::Errored { .. } => Bucket::Errored,
        }
    }
}

impl From<ReconciliationResult> for RowOutcome {
    fn from(result: ReconciliationResult) -> Self {
        match result {
            ReconciliationResult::Consistent { expected, actual } => {
                Self::Consistent { expected, actual }
            }
            ReconciliationResult::Mismatch { expected, actual, delta } => {
                Self::Mismatch { expected, actual, delta }
            }
            ReconciliationResult::MissingInputs { .. } => Self::MissingInputs,
            ReconciliationResult::NoFormula => Self::NoFormula,
        }
    }
}

impl From<&CheckError> for RowOutcome {
    fn from(err: &CheckError) -> Self {
        Self::Errored { error_kind: err.kind().to_string(), error: err.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Consistent,
    Mismatch,
    MissingInputs,
    NoFormula,
    Errored,
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consistent => write!(f, "consistent"),
            Self::Mismatch => write!(f, "mismatch"),
            Self::MissingInputs => write!(f, "missing_inputs"),
            Self::NoFormula => write!(f, "no_formula"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRow {
    pub entity_key: String,
    /// `None` for entities without a formula (one row per entity).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_id: Option<String>,
    #[serde(flatten)]
    pub outcome: RowOutcome,
    /// Referenced codes with no stored value, substituted as zero.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total_rows: usize,
    pub entities_checked: usize,
    pub entities_skipped_deleted: usize,
    pub consistent: usize,
    pub mismatch: usize,
    pub missing_inputs: usize,
    pub no_formula: usize,
    pub errored: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub meta: BatchMeta,
    pub summary: BatchSummary,
    pub rows: Vec<BatchRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub parallel: bool,
}
