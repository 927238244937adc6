// Formula parser - converts KPI formula strings into an AST
// Supports: numbers (12, 1.5, .5, 1e3), variable codes (A, revenue_q1), basic math (+, -, *, /),
// unary signs and parentheses. Function calls and any other syntax are rejected.

use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Variable code, resolved against the value mapping at evaluation time
    Var(String),
    Neg(Box<Expr>),
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div => 2,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
        }
    }
}

/// Parse a formula string into an AST.
pub fn parse(formula: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Err(EvalError::syntax("empty formula", 0));
    }

    let parsed = parse_add_sub(&tokens, 0, formula.len(), 0)?;
    if let Some(tok) = tokens.get(parsed.pos) {
        return Err(EvalError::syntax(
            format!("unexpected {}", tok.kind.describe()),
            tok.start,
        ));
    }
    Ok(parsed.expr)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
        }
    }
}

/// Token with its byte span in the source formula.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let single = match c {
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            _ => None,
        };
        if let Some(kind) = single {
            chars.next();
            tokens.push(Token { kind, start, end: start + 1 });
            continue;
        }

        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            'A'..='Z' | 'a'..='z' | '_' => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        end = i + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(input[start..end].to_string()),
                    start,
                    end,
                });
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }

                // Exponent only when digits follow (1e3, 2.5E-4); a bare `e` is left for the
                // identifier branch and becomes a syntax error in the parser.
                if let Some(&(_, 'e' | 'E')) = chars.peek() {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    if let Some(&(_, '+' | '-')) = lookahead.peek() {
                        lookahead.next();
                    }
                    if matches!(lookahead.peek(), Some(&(_, d)) if d.is_ascii_digit()) {
                        chars = lookahead;
                        while let Some(&(i, d)) = chars.peek() {
                            if d.is_ascii_digit() {
                                end = i + 1;
                                chars.next();
                            } else {
                                break;
                            }
                        }
                    }
                }

                let text = &input[start..end];
                let num: f64 = text
                    .parse()
                    .map_err(|_| EvalError::syntax(format!("invalid number '{text}'"), start))?;
                if !num.is_finite() {
                    return Err(EvalError::syntax(format!("number out of range '{text}'"), start));
                }
                tokens.push(Token { kind: TokenKind::Number(num), start, end });
            }
            _ => {
                return Err(EvalError::syntax(
                    format!("unexpected character '{c}'"),
                    start,
                ))
            }
        }
    }

    Ok(tokens)
}

/// Deepest expression tree the parser will build, counting nested parentheses,
/// unary signs and operator chains. Evaluation, printing and drop all recurse
/// over the tree.
pub const MAX_DEPTH: usize = 256;

/// A parsed subtree with its height. `pos` is the next unread token.
struct Parsed {
    expr: Expr,
    height: usize,
    pos: usize,
}

type ParseResult = Result<Parsed, EvalError>;

fn nested_too_deeply(position: usize) -> EvalError {
    EvalError::syntax("formula nested too deeply", position)
}

fn parse_add_sub(tokens: &[Token], pos: usize, eof: usize, depth: usize) -> ParseResult {
    let mut left = parse_mul_div(tokens, pos, eof, depth)?;

    while let Some(tok) = tokens.get(left.pos) {
        let op = match tok.kind {
            TokenKind::Plus => Op::Add,
            TokenKind::Minus => Op::Sub,
            _ => break,
        };
        let right = parse_mul_div(tokens, left.pos + 1, eof, depth)?;
        left = join(op, left, right, tok.start)?;
    }

    Ok(left)
}

fn parse_mul_div(tokens: &[Token], pos: usize, eof: usize, depth: usize) -> ParseResult {
    let mut left = parse_unary(tokens, pos, eof, depth)?;

    while let Some(tok) = tokens.get(left.pos) {
        let op = match tok.kind {
            TokenKind::Star => Op::Mul,
            TokenKind::Slash => Op::Div,
            _ => break,
        };
        let right = parse_unary(tokens, left.pos + 1, eof, depth)?;
        left = join(op, left, right, tok.start)?;
    }

    Ok(left)
}

/// Combine two operands under `op`. Long chains grow the tree one level per term.
fn join(op: Op, left: Parsed, right: Parsed, at: usize) -> ParseResult {
    let height = left.height.max(right.height) + 1;
    if height > MAX_DEPTH {
        return Err(nested_too_deeply(at));
    }
    Ok(Parsed {
        expr: Expr::BinaryOp {
            op,
            left: Box::new(left.expr),
            right: Box::new(right.expr),
        },
        height,
        pos: right.pos,
    })
}

fn parse_unary(tokens: &[Token], pos: usize, eof: usize, depth: usize) -> ParseResult {
    if depth > MAX_DEPTH {
        return Err(nested_too_deeply(tokens.get(pos).map_or(eof, |t| t.start)));
    }
    match tokens.get(pos).map(|t| &t.kind) {
        // Unary plus is a no-op
        Some(TokenKind::Plus) => parse_unary(tokens, pos + 1, eof, depth + 1),
        Some(TokenKind::Minus) => {
            let inner = parse_unary(tokens, pos + 1, eof, depth + 1)?;
            if inner.height + 1 > MAX_DEPTH {
                return Err(nested_too_deeply(tokens[pos].start));
            }
            Ok(Parsed {
                expr: Expr::Neg(Box::new(inner.expr)),
                height: inner.height + 1,
                pos: inner.pos,
            })
        }
        _ => parse_primary(tokens, pos, eof, depth),
    }
}

fn parse_primary(tokens: &[Token], pos: usize, eof: usize, depth: usize) -> ParseResult {
    let Some(tok) = tokens.get(pos) else {
        return Err(EvalError::syntax("unexpected end of formula", eof));
    };

    let leaf = |expr: Expr| -> ParseResult { Ok(Parsed { expr, height: 1, pos: pos + 1 }) };
    match &tok.kind {
        TokenKind::Number(n) => leaf(Expr::Number(*n)),
        TokenKind::Ident(name) => {
            if let Some(next) = tokens.get(pos + 1) {
                if next.kind == TokenKind::LParen {
                    return Err(EvalError::syntax(
                        format!("function calls are not supported ('{name}')"),
                        tok.start,
                    ));
                }
            }
            leaf(Expr::Var(name.clone()))
        }
        TokenKind::LParen => {
            let inner = parse_add_sub(tokens, pos + 1, eof, depth + 1)?;
            match tokens.get(inner.pos) {
                Some(t) if t.kind == TokenKind::RParen => Ok(Parsed {
                    pos: inner.pos + 1,
                    ..inner
                }),
                Some(t) => Err(EvalError::syntax(
                    format!("expected ')' but found {}", t.kind.describe()),
                    t.start,
                )),
                None => Err(EvalError::syntax("missing closing parenthesis", eof)),
            }
        }
        other => Err(EvalError::syntax(
            format!("unexpected {}", other.describe()),
            tok.start,
        )),
    }
}

// =============================================================================
// Formula Printing - Convert Expr back to string
// =============================================================================

/// Format an expression as a formula string, adding only the parentheses
/// needed to keep the same tree when parsed again.
pub fn format_expr(expr: &Expr) -> String {
    match expr {
        Expr::Number(n) => format!("{n}"),
        Expr::Var(code) => code.clone(),
        Expr::Neg(inner) => match inner.as_ref() {
            Expr::BinaryOp { .. } => format!("-({})", format_expr(inner)),
            _ => format!("-{}", format_expr(inner)),
        },
        Expr::BinaryOp { op, left, right } => {
            let l = format_operand(left, *op, false);
            let r = format_operand(right, *op, true);
            format!("{l} {} {r}", op.symbol())
        }
    }
}

fn format_operand(expr: &Expr, parent: Op, is_right: bool) -> String {
    let needs_parens = match expr {
        Expr::BinaryOp { op, .. } => {
            if is_right {
                op.precedence() <= parent.precedence()
            } else {
                op.precedence() < parent.precedence()
            }
        }
        _ => false,
    };

    if needs_parens {
        format!("({})", format_expr(expr))
    } else {
        format_expr(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(code: &str) -> Box<Expr> {
        Box::new(Expr::Var(code.to_string()))
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse("42").unwrap(), Expr::Number(42.0));
        assert_eq!(parse(".5").unwrap(), Expr::Number(0.5));
        assert_eq!(parse("1e3").unwrap(), Expr::Number(1000.0));
        assert_eq!(parse("2.5E-1").unwrap(), Expr::Number(0.25));
    }

    #[test]
    fn test_parse_precedence() {
        // A + B * C → A + (B * C)
        let expr = parse("A + B * C").unwrap();
        assert_eq!(
            expr,
            Expr::BinaryOp {
                op: Op::Add,
                left: var("A"),
                right: Box::new(Expr::BinaryOp {
                    op: Op::Mul,
                    left: var("B"),
                    right: var("C"),
                }),
            }
        );
    }

    #[test]
    fn test_parse_left_associative() {
        // A - B - C → (A - B) - C
        let expr = parse("A - B - C").unwrap();
        match expr {
            Expr::BinaryOp { op: Op::Sub, left, right } => {
                assert_eq!(*right, Expr::Var("C".into()));
                assert!(matches!(*left, Expr::BinaryOp { op: Op::Sub, .. }));
            }
            other => panic!("expected Sub, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unary_minus() {
        assert_eq!(parse("-A").unwrap(), Expr::Neg(var("A")));
        assert_eq!(parse("--A").unwrap(), Expr::Neg(Box::new(Expr::Neg(var("A")))));
        assert_eq!(parse("+A").unwrap(), Expr::Var("A".into()));
    }

    #[test]
    fn test_identifiers_with_digits_and_underscores() {
        assert_eq!(parse("_rev_2024").unwrap(), Expr::Var("_rev_2024".into()));
    }

    #[test]
    fn test_number_then_identifier_is_error() {
        // `2A` is a number followed by an identifier with no operator between
        let err = parse("2A").unwrap_err();
        assert!(matches!(err, EvalError::Syntax { position: 1, .. }), "{err:?}");
    }

    #[test]
    fn test_unbalanced_parens() {
        assert!(matches!(parse("(A + B").unwrap_err(), EvalError::Syntax { position: 6, .. }));
        assert!(matches!(parse("A + B)").unwrap_err(), EvalError::Syntax { position: 5, .. }));
    }

    #[test]
    fn test_dangling_operator() {
        assert!(matches!(parse("A +").unwrap_err(), EvalError::Syntax { .. }));
        assert!(matches!(parse("* A").unwrap_err(), EvalError::Syntax { .. }));
    }

    #[test]
    fn test_empty_formula() {
        assert!(matches!(parse("").unwrap_err(), EvalError::Syntax { position: 0, .. }));
        assert!(matches!(parse("   ").unwrap_err(), EvalError::Syntax { .. }));
    }

    #[test]
    fn test_function_call_rejected() {
        let err = parse("max(A, B)").unwrap_err();
        assert!(err.to_string().contains("function calls"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = parse("A ; B").unwrap_err();
        assert_eq!(
            err,
            EvalError::Syntax { message: "unexpected character ';'".into(), position: 2 }
        );
        assert!(parse("A ^ 2").is_err());
        assert!(parse("A, B").is_err());
    }

    #[test]
    fn test_invalid_number() {
        assert!(matches!(parse("1.2.3").unwrap_err(), EvalError::Syntax { position: 0, .. }));
        assert!(parse(".").is_err());
    }

    #[test]
    fn test_number_out_of_range() {
        let err = parse("1e999").unwrap_err();
        assert_eq!(
            err,
            EvalError::Syntax { message: "number out of range '1e999'".into(), position: 0 }
        );
        assert!(matches!(parse("A - 1e999").unwrap_err(), EvalError::Syntax { position: 4, .. }));
        // Large but finite literals still parse
        assert_eq!(parse("1e300").unwrap(), Expr::Number(1e300));
    }

    #[test]
    fn test_deep_parens_rejected() {
        let formula = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = parse(&formula).unwrap_err();
        assert_eq!(
            err,
            EvalError::Syntax {
                message: "formula nested too deeply".into(),
                position: MAX_DEPTH + 1,
            }
        );
    }

    #[test]
    fn test_deep_unary_rejected() {
        let formula = format!("{}A", "-".repeat(10_000));
        assert!(matches!(parse(&formula).unwrap_err(), EvalError::Syntax { .. }));
    }

    #[test]
    fn test_long_chain_rejected() {
        let formula = vec!["a"; 20_000].join(" + ");
        let err = parse(&formula).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"), "{err}");
    }

    #[test]
    fn test_nesting_within_limit() {
        let formula = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&formula).unwrap(), Expr::Number(1.0));

        let chain = vec!["a"; 200].join(" + ");
        let expr = parse(&chain).unwrap();
        assert_eq!(format_expr(&expr), chain);
    }

    #[test]
    fn test_token_spans() {
        let tokens = tokenize("ab * 100").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!((tokens[0].start, tokens[0].end), (0, 2));
        assert_eq!((tokens[2].start, tokens[2].end), (5, 8));
    }

    #[test]
    fn test_format_minimal_parens() {
        for (input, expected) in [
            ("A + B * C", "A + B * C"),
            ("(A + B) * C", "(A + B) * C"),
            ("A - (B - C)", "A - (B - C)"),
            ("(A - B) - C", "A - B - C"),
            ("A / (B * C)", "A / (B * C)"),
            ("-(A + B)", "-(A + B)"),
            ("((A))", "A"),
            ("1.5 * x", "1.5 * x"),
        ] {
            assert_eq!(format_expr(&parse(input).unwrap()), expected, "input: {input}");
        }
    }

    #[test]
    fn test_format_reparses_to_same_tree() {
        let expr = parse("(a + b) / (c - -d) * e").unwrap();
        let printed = format_expr(&expr);
        assert_eq!(parse(&printed).unwrap(), expr);
    }
}
