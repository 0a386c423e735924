//! Inline sharding formulas such as `t_order_${order_id % 2}`.
//!
//! A formula is literal text with `${...}` (or `$->{...}`) segments holding a
//! small integer expression over the sharding column: `+ - * / %` with the
//! usual precedence and parentheses.  A segment that is just the column name
//! substitutes the value verbatim, so string keys work too.  `%` is the
//! Euclidean remainder, so negative keys still land on a non-negative suffix.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{ShardingError, ShardingResult};
use crate::models::ShardingValue;

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(?:->)?\{([^{}]*)\}").unwrap());

// ---------------------------------------------------------------------------
// Expression tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Column,
    Int(i64),
    Binary(Box<Expr>, Op, Box<Expr>),
}

impl Expr {
    fn eval(&self, value: i64) -> Option<i64> {
        match self {
            Expr::Column => Some(value),
            Expr::Int(v) => Some(*v),
            Expr::Binary(lhs, op, rhs) => {
                let (a, b) = (lhs.eval(value)?, rhs.eval(value)?);
                match op {
                    Op::Add => a.checked_add(b),
                    Op::Sub => a.checked_sub(b),
                    Op::Mul => a.checked_mul(b),
                    Op::Div => a.checked_div(b),
                    Op::Rem => a.checked_rem_euclid(b),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Int(i64),
    Op(Op),
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        match ch {
            c if c.is_whitespace() => {}
            '+' => tokens.push(Token::Op(Op::Add)),
            '-' => tokens.push(Token::Op(Op::Sub)),
            '*' => tokens.push(Token::Op(Op::Mul)),
            '/' => tokens.push(Token::Op(Op::Div)),
            '%' => tokens.push(Token::Op(Op::Rem)),
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            c if c.is_ascii_digit() => {
                let mut end = start + c.len_utf8();
                while let Some(&(idx, next)) = chars.peek() {
                    if !next.is_ascii_digit() {
                        break;
                    }
                    end = idx + next.len_utf8();
                    chars.next();
                }
                let number = text[start..end]
                    .parse()
                    .map_err(|_| format!("number '{}' out of range", &text[start..end]))?;
                tokens.push(Token::Int(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start + c.len_utf8();
                while let Some(&(idx, next)) = chars.peek() {
                    if !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    end = idx + next.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Ident(text[start..end].to_string()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    column: &'a str,
}

impl Parser<'_> {
    fn peek_op(&self, accepted: &[Op]) -> Option<Op> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) if accepted.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        while let Some(op) = self.peek_op(&[Op::Add, Op::Sub]) {
            self.pos += 1;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(self.term()?));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.factor()?;
        while let Some(op) = self.peek_op(&[Op::Mul, Op::Div, Op::Rem]) {
            self.pos += 1;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(self.factor()?));
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, String> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match token {
            Some(Token::Int(v)) => Ok(Expr::Int(v)),
            Some(Token::Ident(name)) if name.eq_ignore_ascii_case(self.column) => Ok(Expr::Column),
            Some(Token::Ident(name)) => Err(format!("unknown variable '{name}'")),
            Some(Token::Open) => {
                let inner = self.expr()?;
                match self.tokens.get(self.pos) {
                    Some(Token::Close) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err("missing ')'".to_string()),
                }
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn parse_expr(text: &str, column: &str) -> Result<Expr, String> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        column,
    };
    let expr = parser.expr()?;
    if parser.pos != tokens.len() {
        return Err(format!("trailing input in '{text}'"));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Formula
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Expr(Expr),
}

/// A parsed inline formula bound to one sharding column.
#[derive(Clone, PartialEq, Eq)]
pub struct InlineFormula {
    source: String,
    parts: Vec<Part>,
}

impl InlineFormula {
    pub fn parse(formula: &str, column: &str) -> ShardingResult<Self> {
        let invalid = |reason: String| ShardingError::invalid_expression(formula, reason);
        let mut parts = Vec::new();
        let mut last = 0;
        for caps in SEGMENT_RE.captures_iter(formula) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                parts.push(Part::Literal(formula[last..whole.start()].to_string()));
            }
            parts.push(Part::Expr(parse_expr(body.as_str(), column).map_err(invalid)?));
            last = whole.end();
        }
        if last < formula.len() {
            parts.push(Part::Literal(formula[last..].to_string()));
        }
        let has_expr = parts.iter().any(|p| matches!(p, Part::Expr(_)));
        let stray = parts
            .iter()
            .any(|p| matches!(p, Part::Literal(text) if text.contains(['{', '}', '$'])));
        if !has_expr || stray {
            return Err(invalid(format!(
                "expected a formula with ${{...}} segments over '{column}'"
            )));
        }
        Ok(Self {
            source: formula.to_string(),
            parts,
        })
    }

    /// Substitute `value`; `None` when arithmetic needs a number it cannot get
    /// or overflows / divides by zero.
    pub fn render(&self, value: &ShardingValue) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Expr(Expr::Column) => out.push_str(&value.to_string()),
                Part::Expr(expr) => out.push_str(&expr.eval(value.as_i64()?)?.to_string()),
            }
        }
        Some(out)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for InlineFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InlineFormula").field(&self.source).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulo_formula() {
        let formula = InlineFormula::parse("t_order_${order_id % 2}", "order_id").unwrap();
        assert_eq!(formula.render(&7.into()).as_deref(), Some("t_order_1"));
        assert_eq!(formula.render(&"10".into()).as_deref(), Some("t_order_0"));
        assert_eq!(formula.render(&(-3).into()).as_deref(), Some("t_order_1"));
        assert_eq!(formula.render(&"abc".into()), None);
    }

    #[test]
    fn precedence_and_parentheses() {
        let formula = InlineFormula::parse("ds_${(user_id + 1) * 2 % 4}", "user_id").unwrap();
        assert_eq!(formula.render(&2.into()).as_deref(), Some("ds_2"));
        let formula = InlineFormula::parse("ds_$->{user_id / 10 + 1}", "USER_ID").unwrap();
        assert_eq!(formula.render(&25.into()).as_deref(), Some("ds_3"));
    }

    #[test]
    fn bare_column_substitutes_strings() {
        let formula = InlineFormula::parse("t_user_${region}", "region").unwrap();
        assert_eq!(formula.render(&"eu".into()).as_deref(), Some("t_user_eu"));
    }

    #[test]
    fn division_by_zero_yields_none() {
        let formula = InlineFormula::parse("t_${id % 0}", "id").unwrap();
        assert_eq!(formula.render(&1.into()), None);
    }

    #[test]
    fn rejects_bad_formulas() {
        for formula in [
            "t_order",
            "t_${other % 2}",
            "t_${id %}",
            "t_${(id % 2}",
            "t_${id} }",
            "t_${id # 2}",
        ] {
            assert!(
                InlineFormula::parse(formula, "id").is_err(),
                "{formula} should be rejected"
            );
        }
    }
}
