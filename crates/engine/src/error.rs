use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Malformed formula. `position` is a byte offset into the formula text.
    Syntax { message: String, position: usize },
    /// A divisor evaluated to zero.
    DivideByZero,
    /// A referenced code has no value (strict policy only).
    UnknownVariable { code: String },
}

impl EvalError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax { message: message.into(), position }
    }

    /// Short machine-readable tag, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "syntax_error",
            Self::DivideByZero => "divide_by_zero",
            Self::UnknownVariable { .. } => "unknown_variable",
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { message, position } => {
                write!(f, "syntax error at position {position}: {message}")
            }
            Self::DivideByZero => write!(f, "division by zero"),
            Self::UnknownVariable { code } => write!(f, "no value for variable '{code}'"),
        }
    }
}

impl std::error::Error for EvalError {}
