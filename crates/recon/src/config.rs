use std::path::Path;

use kpi_engine::{EvalOptions, MissingVariablePolicy};
use serde::Deserialize;

use crate::error::ReconError;

/// Absolute tolerance used when no config says otherwise.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

const DEFAULT_RELATIVE_TOLERANCE: f64 = 0.001;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

// ---------------------------------------------------------------------------
// Tolerance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceMode {
    #[default]
    Absolute,
    /// Fraction of the larger magnitude, never tighter than `absolute`.
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToleranceConfig {
    #[serde(default)]
    pub mode: ToleranceMode,
    #[serde(default = "default_absolute")]
    pub absolute: f64,
    #[serde(default = "default_relative")]
    pub relative: f64,
}

fn default_absolute() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_relative() -> f64 {
    DEFAULT_RELATIVE_TOLERANCE
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            mode: ToleranceMode::Absolute,
            absolute: DEFAULT_TOLERANCE,
            relative: DEFAULT_RELATIVE_TOLERANCE,
        }
    }
}

impl ToleranceConfig {
    /// Largest difference still counted as agreement (exclusive).
    pub fn bound(&self, expected: f64, actual: f64) -> f64 {
        match self.mode {
            ToleranceMode::Absolute => self.absolute,
            ToleranceMode::Relative => {
                let scale = expected.abs().max(actual.abs());
                (scale * self.relative).max(self.absolute)
            }
        }
    }

    pub fn within(&self, expected: f64, actual: f64) -> bool {
        (expected - actual).abs() < self.bound(expected, actual)
    }
}

// ---------------------------------------------------------------------------
// Evaluation + Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub missing_variables: MissingVariablePolicy,
}

impl EvaluationConfig {
    pub fn options(&self) -> EvalOptions {
        EvalOptions { missing: self.missing_variables }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default)]
    pub include_deleted: bool,
}

fn default_parallel() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { parallel: true, include_deleted: false }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl CheckConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: CheckConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ReconError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Io(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let t = &self.tolerance;
        if !t.absolute.is_finite() || t.absolute <= 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "tolerance.absolute must be a positive number, got {}",
                t.absolute
            )));
        }
        if !t.relative.is_finite() || t.relative <= 0.0 || t.relative >= 1.0 {
            return Err(ReconError::ConfigValidation(format!(
                "tolerance.relative must be between 0 and 1 (exclusive), got {}",
                t.relative
            )));
        }
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("kpi check")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
