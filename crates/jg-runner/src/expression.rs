//! Rule evaluator for Decision / RuleEngine nodes.
//!
//! Supports comparisons (`==`, `!=`, `>`, `<`, `>=`, `<=`), logical
//! operators (`&&`, `||`, `!`), parentheses, string/number/bool/null
//! literals and dotted variable paths resolved against the run context.
//! There are no function calls and nothing is ever executed.
//!
//! Unlike edge conditions elsewhere, a path missing from the context is a
//! hard error rather than `false`.

use jg_core::Context;
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
}

/// Evaluate `rule` against `context`. The rule must reduce to a boolean.
pub fn evaluate(rule: &str, context: &Context) -> Result<bool, ExpressionError> {
    let expr = parse(rule)?;
    match expr.eval(context)? {
        Operand::Bool(b) => Ok(b),
        other => Err(invalid(format!(
            "expression does not reduce to a boolean (got {})",
            other.kind()
        ))),
    }
}

/// Parse without evaluating, e.g. to validate a rule at authoring time.
pub fn parse(rule: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(rule)?;
    if tokens.is_empty() {
        return Err(invalid("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(invalid(format!("unexpected token {tok:?}"))),
    }
}

fn invalid(message: impl Into<String>) -> ExpressionError {
    ExpressionError::InvalidExpression(message.into())
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Cmp(CmpOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let at = |i: usize| chars.get(i).copied();
    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(c) = at(i) {
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if at(i + 1) == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if at(i + 1) == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            // `===` / `!==` are accepted as plain equality.
            '=' if at(i + 1) == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Eq));
                i += if at(i + 2) == Some('=') { 3 } else { 2 };
            }
            '!' if at(i + 1) == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Ne));
                i += if at(i + 2) == Some('=') { 3 } else { 2 };
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' | '<' => {
                let or_equal = at(i + 1) == Some('=');
                let op = match (c, or_equal) {
                    ('>', true) => CmpOp::Ge,
                    ('>', false) => CmpOp::Gt,
                    ('<', true) => CmpOp::Le,
                    _ => CmpOp::Lt,
                };
                tokens.push(Token::Cmp(op));
                i += if or_equal { 2 } else { 1 };
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| invalid("unterminated string literal"))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit()
                || (c == '-' && at(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while at(i).is_some_and(|ch| ch.is_ascii_digit() || ch == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("invalid number {text}")))?;
                tokens.push(Token::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while at(i).is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => {
                        if word.split('.').any(str::is_empty) {
                            return Err(invalid(format!("malformed path {word}")));
                        }
                        Token::Ident(word)
                    }
                });
            }
            other => return Err(invalid(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// AST + recursive-descent parser: precedence: ! > comparison > && > ||
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Path(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_unary()?;
        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.parse_unary()?;
            if let Some(Token::Cmp(_)) = self.peek() {
                return Err(invalid("chained comparisons are not supported"));
            }
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    /// `!` binds to the operand directly: `!a == b` is `(!a) == b`.
    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Literal(Literal::Num(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Literal::Str(s))),
            Some(Token::Bool(b)) => Ok(Expr::Literal(Literal::Bool(b))),
            Some(Token::Null) => Ok(Expr::Literal(Literal::Null)),
            Some(Token::Ident(path)) => Ok(Expr::Path(path)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(invalid("missing closing parenthesis")),
                }
            }
            Some(tok) => Err(invalid(format!("expected a value, found {tok:?}"))),
            None => Err(invalid("unexpected end of expression")),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    /// Arrays and objects: only usable with `==` / `!=`.
    Json(Value),
}

impl Operand {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Operand::Null,
            Value::Bool(b) => Operand::Bool(*b),
            Value::Number(n) => n.as_f64().map(Operand::Num).unwrap_or(Operand::Null),
            Value::String(s) => Operand::Str(s.clone()),
            other => Operand::Json(other.clone()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Operand::Num(_) => "number",
            Operand::Str(_) => "string",
            Operand::Bool(_) => "boolean",
            Operand::Null => "null",
            Operand::Json(Value::Array(_)) => "array",
            Operand::Json(_) => "object",
        }
    }

    fn expect_bool(self, op: &str) -> Result<bool, ExpressionError> {
        match self {
            Operand::Bool(b) => Ok(b),
            other => Err(invalid(format!(
                "operand of {op} must be a boolean, got {}",
                other.kind()
            ))),
        }
    }
}

impl Expr {
    fn eval(&self, context: &Context) -> Result<Operand, ExpressionError> {
        match self {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Num(n) => Operand::Num(*n),
                Literal::Str(s) => Operand::Str(s.clone()),
                Literal::Bool(b) => Operand::Bool(*b),
                Literal::Null => Operand::Null,
            }),
            Expr::Path(path) => resolve(context, path).map(Operand::from_value),
            Expr::Not(inner) => Ok(Operand::Bool(!inner.eval(context)?.expect_bool("!")?)),
            Expr::And(l, r) => {
                if !l.eval(context)?.expect_bool("&&")? {
                    return Ok(Operand::Bool(false));
                }
                Ok(Operand::Bool(r.eval(context)?.expect_bool("&&")?))
            }
            Expr::Or(l, r) => {
                if l.eval(context)?.expect_bool("||")? {
                    return Ok(Operand::Bool(true));
                }
                Ok(Operand::Bool(r.eval(context)?.expect_bool("||")?))
            }
            Expr::Compare(op, l, r) => {
                let left = l.eval(context)?;
                let right = r.eval(context)?;
                compare(*op, &left, &right).map(Operand::Bool)
            }
        }
    }
}

fn resolve<'a>(context: &'a Context, path: &str) -> Result<&'a Value, ExpressionError> {
    let mut segments = path.split('.');
    let head = segments.next().unwrap_or_default();
    let mut current = context
        .get(head)
        .ok_or_else(|| ExpressionError::UnknownVariable(path.to_string()))?;
    for segment in segments {
        current = current
            .get(segment)
            .ok_or_else(|| ExpressionError::UnknownVariable(path.to_string()))?;
    }
    Ok(current)
}

fn compare(op: CmpOp, left: &Operand, right: &Operand) -> Result<bool, ExpressionError> {
    let same_kind = std::mem::discriminant(left) == std::mem::discriminant(right);
    match op {
        CmpOp::Eq => Ok(same_kind && left == right),
        CmpOp::Ne => Ok(!(same_kind && left == right)),
        CmpOp::Gt | CmpOp::Lt | CmpOp::Ge | CmpOp::Le => {
            let ordering = match (left, right) {
                (Operand::Num(l), Operand::Num(r)) => l.partial_cmp(r),
                (Operand::Str(l), Operand::Str(r)) => Some(l.cmp(r)),
                _ => {
                    return Err(invalid(format!(
                        "cannot order {} and {}",
                        left.kind(),
                        right.kind()
                    )))
                }
            };
            // NaN compares false with everything.
            let Some(ordering) = ordering else {
                return Ok(false);
            };
            Ok(match op {
                CmpOp::Gt => ordering == Ordering::Greater,
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Ge => ordering != Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => Context::new(),
        }
    }

    #[test]
    fn numeric_comparisons() {
        let c = ctx(json!({"temperature": 95, "vibration": 30.5}));
        assert!(evaluate("temperature > 90", &c).unwrap());
        assert!(!evaluate("temperature < 90", &c).unwrap());
        assert!(evaluate("temperature >= 95", &c).unwrap());
        assert!(evaluate("vibration <= 30.5", &c).unwrap());
        assert!(evaluate("temperature == 95.0", &c).unwrap());
        assert!(evaluate("temperature > -1", &c).unwrap());
    }

    #[test]
    fn logical_operators_and_grouping() {
        let c = ctx(json!({"temperature": 85, "vibration": 60, "override": false}));
        assert!(evaluate("temperature > 80 && vibration > 50", &c).unwrap());
        assert!(!evaluate("temperature > 90 || vibration < 50", &c).unwrap());
        assert!(evaluate("!(temperature > 90) && !override", &c).unwrap());
        assert!(evaluate("(temperature > 90 || vibration > 50) && override == false", &c).unwrap());
    }

    #[test]
    fn not_binds_tighter_than_comparison() {
        assert_eq!(
            parse("!ready == done").unwrap(),
            Expr::Compare(
                CmpOp::Eq,
                Box::new(Expr::Not(Box::new(Expr::Path("ready".into())))),
                Box::new(Expr::Path("done".into())),
            )
        );

        let c = ctx(json!({"count": 0, "ready": false}));
        assert!(matches!(
            evaluate("!count == 0", &c),
            Err(ExpressionError::InvalidExpression(_))
        ));
        assert!(!evaluate("!(count == 0)", &c).unwrap());
        assert!(evaluate("!ready == true", &c).unwrap());
        assert!(evaluate("!!ready == false", &c).unwrap());
    }

    #[test]
    fn strings_bools_and_null() {
        let c = ctx(json!({"line": "A-3", "passed": true, "note": null}));
        assert!(evaluate(r#"line == "A-3""#, &c).unwrap());
        assert!(evaluate("line != 'B-1'", &c).unwrap());
        assert!(evaluate("line === 'A-3'", &c).unwrap());
        assert!(evaluate("passed", &c).unwrap());
        assert!(evaluate("note == null", &c).unwrap());
        assert!(evaluate("line < 'B'", &c).unwrap());
    }

    #[test]
    fn dotted_paths() {
        let c = ctx(json!({"sensor": {"reading": {"value": 12}}}));
        assert!(evaluate("sensor.reading.value < 20", &c).unwrap());
        assert_eq!(
            evaluate("sensor.reading.missing < 20", &c),
            Err(ExpressionError::UnknownVariable("sensor.reading.missing".into()))
        );
    }

    #[test]
    fn missing_variable_is_a_hard_error() {
        let c = ctx(json!({}));
        assert_eq!(
            evaluate("temperature > 90", &c),
            Err(ExpressionError::UnknownVariable("temperature".into()))
        );
    }

    #[test]
    fn short_circuit_skips_unreached_operands() {
        let c = ctx(json!({"ok": true}));
        assert!(evaluate("ok || missing > 1", &c).unwrap());
        assert!(!evaluate("!ok && missing > 1", &c).unwrap());
    }

    #[test]
    fn mixed_type_equality_is_false() {
        let c = ctx(json!({"count": 1, "label": "1"}));
        assert!(!evaluate("count == label", &c).unwrap());
        assert!(evaluate("count != label", &c).unwrap());
    }

    #[test]
    fn rejects_non_boolean_results() {
        let c = ctx(json!({"temperature": 95}));
        assert!(matches!(
            evaluate("temperature", &c),
            Err(ExpressionError::InvalidExpression(_))
        ));
        assert!(matches!(
            evaluate("temperature && true", &c),
            Err(ExpressionError::InvalidExpression(_))
        ));
        assert!(matches!(
            evaluate("temperature > 'hot'", &c),
            Err(ExpressionError::InvalidExpression(_))
        ));
    }

    #[test]
    fn rejects_unknown_syntax() {
        let c = ctx(json!({"a": 1}));
        for rule in [
            "",
            "a = 1",
            "a > ",
            "(a > 0",
            "a > 0 a",
            "alert('x')",
            "a + 1 > 0",
            "1 < a < 3",
            "'open",
            "a..b == 1",
        ] {
            assert!(
                matches!(evaluate(rule, &c), Err(ExpressionError::InvalidExpression(_))),
                "rule {rule:?} should be rejected"
            );
        }
    }

    #[test]
    fn nan_never_compares() {
        let c = ctx(json!({"x": 1}));
        let nan = Expr::Compare(
            CmpOp::Eq,
            Box::new(Expr::Literal(Literal::Num(f64::NAN))),
            Box::new(Expr::Literal(Literal::Num(f64::NAN))),
        );
        assert_eq!(nan.eval(&c), Ok(Operand::Bool(false)));
        assert_eq!(
            compare(CmpOp::Ge, &Operand::Num(f64::NAN), &Operand::Num(1.0)),
            Ok(false)
        );
    }
}
