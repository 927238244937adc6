// Variable reference extraction

use rustc_hash::FxHashSet;

use super::eval::VarLookup;
use super::parser::{tokenize, TokenKind};
use crate::error::EvalError;

/// Distinct variable codes referenced by `formula`, in order of first occurrence.
///
/// Only lexing is required, so a formula with a grammar error (e.g. a missing
/// parenthesis) still reports its references. Lexical errors are returned.
pub fn referenced_codes(formula: &str) -> Result<Vec<String>, EvalError> {
    let mut seen = FxHashSet::default();
    let mut codes = Vec::new();

    for tok in tokenize(formula)? {
        if let TokenKind::Ident(code) = tok.kind {
            if seen.insert(code.clone()) {
                codes.push(code);
            }
        }
    }

    Ok(codes)
}

/// Referenced codes that `values` has no entry for. These are the codes the
/// zero-substitution policy would silently replace with `0`.
pub fn unresolved_codes<L: VarLookup + ?Sized>(
    formula: &str,
    values: &L,
) -> Result<Vec<String>, EvalError> {
    Ok(referenced_codes(formula)?
        .into_iter()
        .filter(|code| values.value(code).is_none())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_referenced_codes_dedup_in_order() {
        let codes = referenced_codes("(b + a) / b * 100 + c_1").unwrap();
        assert_eq!(codes, vec!["b", "a", "c_1"]);
    }

    #[test]
    fn test_referenced_codes_no_identifiers() {
        assert!(referenced_codes("1 + 2").unwrap().is_empty());
    }

    #[test]
    fn test_referenced_codes_tolerates_grammar_errors() {
        assert_eq!(referenced_codes("(a + b").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_referenced_codes_lex_error() {
        assert!(referenced_codes("a # b").is_err());
    }

    #[test]
    fn test_unresolved_codes() {
        let values: HashMap<String, f64> = HashMap::from([("a".to_string(), 1.0)]);
        assert_eq!(unresolved_codes("a + b + c", &values).unwrap(), vec!["b", "c"]);
        assert!(unresolved_codes("a * 2", &values).unwrap().is_empty());
    }
}
