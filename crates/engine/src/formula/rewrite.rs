// Percentage-scaling rewrite
//
// KPIs whose unit is already a percentage were sometimes authored as `(a / b) * 100`,
// which double-scales once the unit is rendered. The rewrite removes the literal
// `* 100` factors from the top-level product and leaves the rest of the text as written.

use super::parser::{parse, tokenize, Op, Token, TokenKind};

/// True when a unit label already means "percent".
pub fn unit_implies_percent(unit: &str) -> bool {
    matches!(
        unit.trim().to_ascii_lowercase().as_str(),
        "%" | "percent" | "percentage" | "pct"
    )
}

/// One operand of the top-level `*`/`/` chain.
#[derive(Debug)]
struct Factor {
    /// Operator joining this factor to the previous one (`None` for the first).
    op: Option<Op>,
    first: usize,
    last: usize,
    start: usize,
    end: usize,
}

impl Factor {
    fn is_hundred(&self, tokens: &[Token]) -> bool {
        self.first == self.last
            && matches!(tokens[self.first].kind, TokenKind::Number(n) if n == 100.0)
    }
}

/// Remove redundant `* 100` scaling from a formula.
///
/// Applies only when the whole formula is a product/quotient chain at the top
/// level (no top-level `+`/`-`). Every `* 100` factor after the first is removed,
/// and a leading `100 *` is removed when another factor remains. The result
/// never contains a removable factor, so applying the rewrite twice is the same
/// as applying it once. Unparsable formulas are returned unchanged.
pub fn strip_percent_scaling(formula: &str) -> String {
    if parse(formula).is_err() {
        return formula.to_string();
    }
    let Ok(tokens) = tokenize(formula) else {
        return formula.to_string();
    };
    let Some(factors) = top_level_factors(&tokens) else {
        return formula.to_string();
    };

    let n = factors.len();
    let mut keep = vec![true; n];
    for (k, f) in factors.iter().enumerate().skip(1) {
        if f.op == Some(Op::Mul) && f.is_hundred(&tokens) {
            keep[k] = false;
        }
    }
    if factors[0].is_hundred(&tokens) {
        if let Some(next) = (1..n).find(|&k| keep[k]) {
            if factors[next].op == Some(Op::Mul) {
                keep[0] = false;
            }
        }
    }

    if keep.iter().all(|k| *k) {
        return formula.to_string();
    }

    let mut out = String::with_capacity(formula.len());
    out.push_str(&formula[..factors[0].start]);
    let mut emitted = false;
    for (k, f) in factors.iter().enumerate() {
        if !keep[k] {
            continue;
        }
        if emitted {
            // Text from the original predecessor carries this factor's own operator
            out.push_str(&formula[factors[k - 1].end..f.end]);
        } else {
            out.push_str(&formula[f.start..f.end]);
            emitted = true;
        }
    }
    out.push_str(&formula[factors[n - 1].end..]);
    out
}

/// Split a token stream into its top-level `*`/`/` operands. Returns `None` if a
/// binary `+`/`-` appears at the top level.
fn top_level_factors(tokens: &[Token]) -> Option<Vec<Factor>> {
    let mut factors = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<usize> = None;
    let mut pending_op: Option<Op> = None;

    for (i, tok) in tokens.iter().enumerate() {
        let top = depth == 0;
        match tok.kind {
            TokenKind::Star | TokenKind::Slash if top => {
                let first = current.take()?;
                factors.push(Factor {
                    op: pending_op.take(),
                    first,
                    last: i - 1,
                    start: tokens[first].start,
                    end: tokens[i - 1].end,
                });
                pending_op = Some(if tok.kind == TokenKind::Star { Op::Mul } else { Op::Div });
                continue;
            }
            TokenKind::Plus | TokenKind::Minus
                if top && i > 0 && ends_operand(&tokens[i - 1].kind) =>
            {
                return None;
            }
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        current.get_or_insert(i);
    }

    let first = current?;
    let last = tokens.len() - 1;
    factors.push(Factor {
        op: pending_op,
        first,
        last,
        start: tokens[first].start,
        end: tokens[last].end,
    });
    Some(factors)
}

fn ends_operand(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Number(_) | TokenKind::Ident(_) | TokenKind::RParen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_implies_percent() {
        assert!(unit_implies_percent("%"));
        assert!(unit_implies_percent(" Percent "));
        assert!(unit_implies_percent("PERCENTAGE"));
        assert!(unit_implies_percent("pct"));
        assert!(!unit_implies_percent("SAR"));
        assert!(!unit_implies_percent(""));
    }

    #[test]
    fn test_strip_trailing_hundred() {
        assert_eq!(strip_percent_scaling("(A / B) * 100"), "(A / B)");
        assert_eq!(strip_percent_scaling("A/B*100"), "A/B");
        assert_eq!(strip_percent_scaling("done / total * 100.0"), "done / total");
    }

    #[test]
    fn test_strip_leading_hundred() {
        assert_eq!(strip_percent_scaling("100 * A / B"), "A / B");
        assert_eq!(strip_percent_scaling("100*(A/B)"), "(A/B)");
    }

    #[test]
    fn test_strip_repeated_and_middle() {
        assert_eq!(strip_percent_scaling("A * 100 * 100"), "A");
        assert_eq!(strip_percent_scaling("A * 100 / B"), "A / B");
        assert_eq!(strip_percent_scaling("100 * 100 * A"), "A");
    }

    #[test]
    fn test_preserves_surrounding_whitespace() {
        assert_eq!(strip_percent_scaling("  (a/b) * 100  "), "  (a/b)  ");
    }

    #[test]
    fn test_leaves_non_removable_forms() {
        for formula in [
            "A / 100",
            "100 / A",
            "100",
            "A + B * 100",
            "(A * 100) + B",
            "A * 1000",
            "-100 * A",
            "(A / B * 100)",
            "not valid (",
        ] {
            assert_eq!(strip_percent_scaling(formula), formula, "formula: {formula}");
        }
    }

    #[test]
    fn test_hundred_times_hundred_keeps_one_factor() {
        assert_eq!(strip_percent_scaling("100 * 100"), "100");
    }

    #[test]
    fn test_unary_sign_factor_is_not_additive() {
        assert_eq!(strip_percent_scaling("-A * 100"), "-A");
        assert_eq!(strip_percent_scaling("A * -B * 100"), "A * -B");
    }

    #[test]
    fn test_idempotent() {
        for formula in [
            "(A / B) * 100",
            "100 * 100 * A",
            "100 * A * 100 / B * 100",
            "A * 100 * 100",
            "100 * 100",
            "x",
        ] {
            let once = strip_percent_scaling(formula);
            let twice = strip_percent_scaling(&once);
            assert_eq!(once, twice, "formula: {formula}");
        }
    }
}
