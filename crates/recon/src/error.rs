use std::fmt;

use kpi_engine::EvalError;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (negative tolerance, etc.).
    ConfigValidation(String),
    /// Snapshot JSON could not be read as entities.
    SnapshotParse(String),
    /// Migration input is not an entity collection.
    MigrationInput(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::SnapshotParse(msg) => write!(f, "snapshot parse error: {msg}"),
            Self::MigrationInput(msg) => write!(f, "migration input error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

/// Failure to check one (entity, period) pair. Never aborts a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckError {
    /// The formula could not be evaluated.
    Eval(EvalError),
    /// Two stored values for the same variable in one period.
    DuplicateValue { period: String, code: String },
}

impl CheckError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Eval(err) => err.kind(),
            Self::DuplicateValue { .. } => "duplicate_value",
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eval(err) => write!(f, "{err}"),
            Self::DuplicateValue { period, code } => {
                write!(f, "period '{period}': more than one value for variable '{code}'")
            }
        }
    }
}

impl std::error::Error for CheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Eval(err) => Some(err),
            Self::DuplicateValue { .. } => None,
        }
    }
}

impl From<EvalError> for CheckError {
    fn from(err: EvalError) -> Self {
        Self::Eval(err)
    }
}
