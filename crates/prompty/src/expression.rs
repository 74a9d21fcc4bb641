/*
 * expression.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The restricted expression language used by `eval` attributes.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and ( "||" and )*
//! and        := comparison ( "&&" comparison )*
//! comparison := unary ( ( "==" | "!=" | "<" | ">" | "<=" | ">=" ) unary )*
//! unary      := "!" unary | primary
//! primary    := literal | path | call | "(" or ")"
//! call       := name "(" ( or ( "," or )* )? ")"
//! literal    := string | number | "true" | "false" | "null"
//! ```
//!
//! Paths are resolved against the active [`Context`]; function calls resolve
//! only through the [`FunctionRegistry`]. There is no assignment and no way to
//! reach host functionality from an expression.

use std::cmp::Ordering;
use std::fmt;
use std::time::Instant;

use crate::context::Context;
use crate::error::{ExpressionErrorKind, LimitKind, PromptyError, PromptyResult};
use crate::functions::FunctionRegistry;
use crate::position::Position;
use crate::value::Value;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Dotted variable path, e.g. `user.name`.
    Path(String),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    fn is_comparison(&self) -> bool {
        !matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Expr {
    /// Names of all functions called anywhere in the expression.
    pub fn called_functions(&self) -> Vec<(&str, usize)> {
        let mut calls = Vec::new();
        self.collect_calls(&mut calls);
        calls
    }

    fn collect_calls<'a>(&'a self, calls: &mut Vec<(&'a str, usize)>) {
        match self {
            Expr::Literal(_) | Expr::Path(_) => {}
            Expr::Not(inner) => inner.collect_calls(calls),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_calls(calls);
                rhs.collect_calls(calls);
            }
            Expr::Call { name, args } => {
                calls.push((name.as_str(), args.len()));
                for arg in args {
                    arg.collect_calls(calls);
                }
            }
        }
    }
}

/// A syntax error in expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprSyntaxError {
    /// `Syntax` or `UnknownOperator`.
    pub kind: ExpressionErrorKind,
    pub message: String,
    /// Byte offset inside the expression text.
    pub offset: usize,
}

impl fmt::Display for ExprSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.offset)
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Bang,
    Op(BinaryOp),
    /// Operator-like text the language does not define.
    Unknown(String),
    End,
}

fn tokenize(src: &str) -> Result<Vec<(Tok, usize)>, ExprSyntaxError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        let two = src.get(i..i + 2).unwrap_or("");
        let op = match two {
            "==" => Some(BinaryOp::Eq),
            "!=" => Some(BinaryOp::Ne),
            "<=" => Some(BinaryOp::Le),
            ">=" => Some(BinaryOp::Ge),
            "&&" => Some(BinaryOp::And),
            "||" => Some(BinaryOp::Or),
            _ => None,
        };
        if let Some(op) = op {
            tokens.push((Tok::Op(op), start));
            i += 2;
            continue;
        }

        match c {
            b'(' => tokens.push((Tok::LParen, start)),
            b')' => tokens.push((Tok::RParen, start)),
            b',' => tokens.push((Tok::Comma, start)),
            b'!' => tokens.push((Tok::Bang, start)),
            b'<' => tokens.push((Tok::Op(BinaryOp::Lt), start)),
            b'>' => tokens.push((Tok::Op(BinaryOp::Gt), start)),
            b'"' | b'\'' => {
                let (s, next) = lex_string(src, i)?;
                tokens.push((Tok::Str(s), start));
                i = next;
                continue;
            }
            b'0'..=b'9' => {
                let (tok, next) = lex_number(src, i)?;
                tokens.push((tok, start));
                i = next;
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let mut end = i;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_' || bytes[end] == b'.')
                {
                    end += 1;
                }
                let ident = &src[i..end];
                if ident.ends_with('.') || ident.contains("..") {
                    return Err(syntax(format!("malformed path `{}`", ident), start));
                }
                tokens.push((Tok::Ident(ident.to_string()), start));
                i = end;
                continue;
            }
            b'+' | b'-' | b'*' | b'/' | b'%' | b'=' | b'&' | b'|' | b'^' | b'~' | b'?' | b':' => {
                tokens.push((Tok::Unknown((c as char).to_string()), start));
            }
            _ => {
                let ch = src[i..].chars().next().unwrap_or('?');
                return Err(syntax(format!("unexpected character `{}`", ch), start));
            }
        }
        i += 1;
    }

    tokens.push((Tok::End, src.len()));
    Ok(tokens)
}

fn lex_string(src: &str, start: usize) -> Result<(String, usize), ExprSyntaxError> {
    let quote = src.as_bytes()[start] as char;
    let mut out = String::new();
    let mut chars = src[start + 1..].char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((out, start + 1 + i + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            c => out.push(c),
        }
    }

    Err(syntax("unterminated string literal", start))
}

fn lex_number(src: &str, start: usize) -> Result<(Tok, usize), ExprSyntaxError> {
    let bytes = src.as_bytes();
    let mut end = start;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }

    let text = &src[start..end];
    let tok = if seen_dot {
        text.parse::<f64>().map(Tok::Float).ok()
    } else {
        text.parse::<i64>().map(Tok::Int).ok()
    };
    tok.map(|t| (t, end))
        .ok_or_else(|| syntax(format!("invalid number `{}`", text), start))
}

fn syntax(message: impl Into<String>, offset: usize) -> ExprSyntaxError {
    ExprSyntaxError {
        kind: ExpressionErrorKind::Syntax,
        message: message.into(),
        offset,
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Maximum nesting of parentheses, calls, `!` and operator chains.
pub const MAX_EXPRESSION_DEPTH: usize = 128;

/// Parse expression text.
pub fn parse(src: &str) -> Result<Expr, ExprSyntaxError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    if parser.peek() == &Tok::End {
        return Err(syntax("empty expression", 0));
    }
    let expr = parser.parse_or()?;
    match parser.peek() {
        Tok::End => Ok(expr),
        Tok::Unknown(op) => Err(unknown_operator(op, parser.offset())),
        other => Err(syntax(
            format!("unexpected {} after expression", describe(other)),
            parser.offset(),
        )),
    }
}

struct Parser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    /// Enter one level of nesting.
    ///
    /// Every level adds a layer to the tree the evaluator recurses over, so
    /// the limit bounds evaluation depth as well as parsing.
    fn descend(&mut self, offset: usize) -> Result<(), ExprSyntaxError> {
        if self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(syntax("expression nested too deeply", offset));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ExprSyntaxError> {
        let depth = self.depth;
        let mut lhs = self.parse_and()?;
        while self.peek() == &Tok::Op(BinaryOp::Or) {
            self.descend(self.offset())?;
            self.bump();
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprSyntaxError> {
        let depth = self.depth;
        let mut lhs = self.parse_comparison()?;
        while self.peek() == &Tok::Op(BinaryOp::And) {
            self.descend(self.offset())?;
            self.bump();
            let rhs = self.parse_comparison()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprSyntaxError> {
        let depth = self.depth;
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek().clone() {
                Tok::Op(op) if op.is_comparison() => {
                    self.descend(self.offset())?;
                    self.bump();
                    let rhs = self.parse_unary()?;
                    lhs = binary(op, lhs, rhs);
                }
                Tok::Unknown(op) => return Err(unknown_operator(&op, self.offset())),
                _ => {
                    self.depth = depth;
                    return Ok(lhs);
                }
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprSyntaxError> {
        if self.peek() == &Tok::Bang {
            self.descend(self.offset())?;
            self.bump();
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprSyntaxError> {
        let offset = self.offset();
        match self.bump() {
            Tok::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Tok::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Tok::Str(s) => Ok(Expr::Literal(Value::String(s))),
            // Negative number literal
            Tok::Unknown(op) if op == "-" => match self.bump() {
                Tok::Int(n) => Ok(Expr::Literal(Value::Int(-n))),
                Tok::Float(f) => Ok(Expr::Literal(Value::Float(-f))),
                _ => Err(unknown_operator("-", offset)),
            },
            Tok::Ident(name) => {
                if self.peek() == &Tok::LParen {
                    self.descend(offset)?;
                    self.bump();
                    let args = self.parse_args()?;
                    self.depth -= 1;
                    return Ok(Expr::Call { name, args });
                }
                Ok(match name.as_str() {
                    "true" => Expr::Literal(Value::Bool(true)),
                    "false" => Expr::Literal(Value::Bool(false)),
                    "null" => Expr::Literal(Value::Null),
                    _ => Expr::Path(name),
                })
            }
            Tok::LParen => {
                self.descend(offset)?;
                let inner = self.parse_or()?;
                if self.bump() != Tok::RParen {
                    return Err(syntax("expected `)`", self.offset()));
                }
                self.depth -= 1;
                Ok(inner)
            }
            Tok::Unknown(op) => Err(unknown_operator(&op, offset)),
            other => Err(syntax(format!("unexpected {}", describe(&other)), offset)),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprSyntaxError> {
        let mut args = Vec::new();
        if self.peek() == &Tok::RParen {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.bump() {
                Tok::Comma => continue,
                Tok::RParen => return Ok(args),
                other => {
                    return Err(syntax(
                        format!("expected `,` or `)` in argument list, found {}", describe(&other)),
                        self.offset(),
                    ));
                }
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn unknown_operator(op: &str, offset: usize) -> ExprSyntaxError {
    ExprSyntaxError {
        kind: ExpressionErrorKind::UnknownOperator,
        message: format!("unknown operator `{}`", op),
        offset,
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Int(n) => format!("number `{}`", n),
        Tok::Float(f) => format!("number `{}`", f),
        Tok::Str(s) => format!("string \"{}\"", s),
        Tok::Ident(name) => format!("`{}`", name),
        Tok::LParen => "`(`".to_string(),
        Tok::RParen => "`)`".to_string(),
        Tok::Comma => "`,`".to_string(),
        Tok::Bang => "`!`".to_string(),
        Tok::Op(op) => format!("`{}`", op),
        Tok::Unknown(op) => format!("`{}`", op),
        Tok::End => "end of expression".to_string(),
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// What an expression may reach while it evaluates.
pub struct Evaluator<'a> {
    functions: &'a FunctionRegistry,
    function_timeout: std::time::Duration,
    /// Position reported in errors (the owning tag).
    position: Position,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        functions: &'a FunctionRegistry,
        function_timeout: std::time::Duration,
        position: Position,
    ) -> Self {
        Self {
            functions,
            function_timeout,
            position,
        }
    }

    /// Evaluate `expr` against `ctx`.
    pub fn eval(&self, expr: &Expr, ctx: &Context<'_>) -> PromptyResult<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),

            // Absent paths evaluate to null, which is falsy.
            Expr::Path(path) => Ok(ctx.get(path).cloned().unwrap_or_default()),

            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner, ctx)?.is_truthy())),

            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, ctx),

            Expr::Call { name, args } => self.eval_call(name, args, ctx),
        }
    }

    /// Evaluate and reduce to a boolean by truthiness.
    pub fn eval_truthy(&self, expr: &Expr, ctx: &Context<'_>) -> PromptyResult<bool> {
        Ok(self.eval(expr, ctx)?.is_truthy())
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        ctx: &Context<'_>,
    ) -> PromptyResult<Value> {
        match op {
            BinaryOp::And => {
                if !self.eval_truthy(lhs, ctx)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_truthy(rhs, ctx)?))
            }
            BinaryOp::Or => {
                if self.eval_truthy(lhs, ctx)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_truthy(rhs, ctx)?))
            }
            BinaryOp::Eq => Ok(Value::Bool(self.eval(lhs, ctx)?.loose_eq(&self.eval(rhs, ctx)?))),
            BinaryOp::Ne => Ok(Value::Bool(
                !self.eval(lhs, ctx)?.loose_eq(&self.eval(rhs, ctx)?),
            )),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let l = self.eval(lhs, ctx)?;
                let r = self.eval(rhs, ctx)?;
                let ordering = self.compare(op, &l, &r)?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
        }
    }

    fn compare(&self, op: BinaryOp, l: &Value, r: &Value) -> PromptyResult<Ordering> {
        match (l, r) {
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (a, b) if a.is_number() && b.is_number() => {
                let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                a.partial_cmp(&b).ok_or_else(|| {
                    PromptyError::expression(
                        ExpressionErrorKind::TypeMismatch,
                        format!("cannot order NaN with `{}`", op),
                        self.position,
                    )
                })
            }
            (a, b) => Err(PromptyError::expression(
                ExpressionErrorKind::TypeMismatch,
                format!(
                    "cannot compare {} with {} using `{}`",
                    a.type_name(),
                    b.type_name(),
                    op
                ),
                self.position,
            )),
        }
    }

    fn eval_call(&self, name: &str, args: &[Expr], ctx: &Context<'_>) -> PromptyResult<Value> {
        let Some(function) = self.functions.get(name) else {
            return Err(PromptyError::expression(
                ExpressionErrorKind::UnknownFunction,
                format!("unknown function `{}`", name),
                self.position,
            ));
        };

        if !function.accepts(args.len()) {
            return Err(PromptyError::expression(
                ExpressionErrorKind::ArityMismatch,
                format!(
                    "function `{}` expects {} argument(s), got {}",
                    name,
                    function.arity(),
                    args.len()
                ),
                self.position,
            ));
        }

        let values = args
            .iter()
            .map(|arg| self.eval(arg, ctx))
            .collect::<PromptyResult<Vec<_>>>()?;

        let started = Instant::now();
        let result = function.call(&values);
        if started.elapsed() > self.function_timeout {
            return Err(PromptyError::ResourceLimit {
                limit: LimitKind::FunctionTimeout(self.function_timeout),
                position: self.position,
            });
        }

        result.map_err(|e| {
            PromptyError::expression(
                ExpressionErrorKind::FunctionFailed,
                format!("function `{}` failed: {}", name, e),
                self.position,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::Function;
    use serde_json::json;
    use std::time::Duration;

    fn eval_with(src: &str, ctx: &Context<'_>, functions: &FunctionRegistry) -> PromptyResult<Value> {
        let expr = parse(src).expect("expression should parse");
        Evaluator::new(functions, Duration::from_secs(1), Position::start()).eval(&expr, ctx)
    }

    fn eval(src: &str, data: serde_json::Value) -> PromptyResult<Value> {
        let ctx = Context::from_value(data).unwrap();
        eval_with(src, &ctx, &FunctionRegistry::with_builtins())
    }

    fn truthy(src: &str, data: serde_json::Value) -> bool {
        eval(src, data).unwrap().is_truthy()
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn test_parse_precedence() {
        let expr = parse("a || b && !c").unwrap();
        assert_eq!(
            expr,
            binary(
                BinaryOp::Or,
                Expr::Path("a".to_string()),
                binary(
                    BinaryOp::And,
                    Expr::Path("b".to_string()),
                    Expr::Not(Box::new(Expr::Path("c".to_string()))),
                ),
            )
        );
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("-12").unwrap(), Expr::Literal(Value::Int(-12)));
        assert_eq!(parse("1.5").unwrap(), Expr::Literal(Value::Float(1.5)));
        assert_eq!(
            parse(r#""a \"q\"""#).unwrap(),
            Expr::Literal(Value::from("a \"q\""))
        );
        assert_eq!(parse("'x'").unwrap(), Expr::Literal(Value::from("x")));
        assert_eq!(parse("null").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn test_parse_call() {
        let expr = parse("contains(tags, 'x')").unwrap();
        assert_eq!(expr.called_functions(), vec![("contains", 2)]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("").unwrap_err().kind, ExpressionErrorKind::Syntax);
        assert_eq!(parse("(a").unwrap_err().kind, ExpressionErrorKind::Syntax);
        assert_eq!(parse("a b").unwrap_err().kind, ExpressionErrorKind::Syntax);
        assert_eq!(parse("'open").unwrap_err().kind, ExpressionErrorKind::Syntax);
        assert_eq!(parse("a..b").unwrap_err().kind, ExpressionErrorKind::Syntax);
        assert_eq!(
            parse("a + b").unwrap_err().kind,
            ExpressionErrorKind::UnknownOperator
        );
        assert_eq!(
            parse("a = b").unwrap_err().kind,
            ExpressionErrorKind::UnknownOperator
        );
    }

    #[test]
    fn test_deep_parentheses_are_rejected() {
        let src = format!("{}a{}", "(".repeat(20_000), ")".repeat(20_000));
        let err = parse(&src).unwrap_err();
        assert_eq!(err.kind, ExpressionErrorKind::Syntax);
        assert!(err.message.contains("nested too deeply"), "{}", err.message);
        assert_eq!(err.offset, MAX_EXPRESSION_DEPTH);
    }

    #[test]
    fn test_deep_negation_calls_and_chains_are_rejected() {
        let err = parse(&format!("{}a", "!".repeat(20_000))).unwrap_err();
        assert!(err.message.contains("nested too deeply"));

        let src = format!("{}a{}", "len(".repeat(20_000), ")".repeat(20_000));
        assert!(parse(&src).unwrap_err().message.contains("nested too deeply"));

        let chain = vec!["a"; 20_000].join(" || ");
        assert!(parse(&chain).unwrap_err().message.contains("nested too deeply"));
    }

    #[test]
    fn test_moderate_nesting_still_parses() {
        let src = format!("{}a{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(parse(&src).unwrap(), Expr::Path("a".to_string()));
        assert!(parse(&format!("{}a", "!".repeat(20))).is_ok());
        assert!(parse(&vec!["a"; 20].join(" && ")).is_ok());
        // Sibling groups do not accumulate depth
        let siblings = vec!["(a || b)"; 50].join(" && ");
        assert!(parse(&siblings).is_ok());
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    #[test]
    fn test_numeric_comparison() {
        assert!(truthy("n > 0", json!({"n": 3})));
        assert!(!truthy("n>0", json!({"n": -1})));
        assert!(truthy("n >= -1", json!({"n": -1})));
        assert!(truthy("n < 2.5", json!({"n": 2})));
        assert!(truthy("n <= 2", json!({"n": 2.0})));
    }

    #[test]
    fn test_string_comparison() {
        assert!(truthy("a < b", json!({"a": "apple", "b": "banana"})));
        assert!(truthy("a == 'x'", json!({"a": "x"})));
        assert!(truthy("a != 'y'", json!({"a": "x"})));
    }

    #[test]
    fn test_mixed_type_ordering_is_error() {
        let err = eval("n < 'x'", json!({"n": 1})).unwrap_err();
        assert!(matches!(
            err,
            PromptyError::Expression {
                kind: ExpressionErrorKind::TypeMismatch,
                ..
            }
        ));
        // Missing values are null, which cannot be ordered either
        assert!(eval("missing > 0", json!({})).is_err());
    }

    #[test]
    fn test_mixed_type_equality_is_false() {
        assert!(!truthy("n == '1'", json!({"n": 1})));
        assert!(truthy("n != '1'", json!({"n": 1})));
        assert!(truthy("n == 1.0", json!({"n": 1})));
    }

    #[test]
    fn test_truthiness_of_paths() {
        assert!(truthy("items", json!({"items": [1]})));
        assert!(!truthy("items", json!({"items": []})));
        assert!(!truthy("missing", json!({})));
        assert!(truthy("!missing", json!({})));
        assert!(truthy("user.name", json!({"user": {"name": "A"}})));
    }

    #[test]
    fn test_short_circuit() {
        // The right-hand side would be a type error if evaluated.
        assert!(!truthy("false && (1 < 'x')", json!({})));
        assert!(truthy("true || (1 < 'x')", json!({})));
    }

    #[test]
    fn test_function_calls() {
        assert_eq!(eval("len(items)", json!({"items": [1, 2, 3]})).unwrap(), Value::Int(3));
        assert!(truthy("len(name) > 3", json!({"name": "Alice"})));
        assert_eq!(eval("upper('abc')", json!({})).unwrap(), Value::from("ABC"));
    }

    #[test]
    fn test_unknown_function() {
        let err = eval("system('rm')", json!({})).unwrap_err();
        assert!(matches!(
            err,
            PromptyError::Expression {
                kind: ExpressionErrorKind::UnknownFunction,
                ..
            }
        ));
    }

    #[test]
    fn test_arity_mismatch_names_function_and_range() {
        let err = eval("len(a, b)", json!({})).unwrap_err();
        match err {
            PromptyError::Expression { kind, message, .. } => {
                assert_eq!(kind, ExpressionErrorKind::ArityMismatch);
                assert!(message.contains("len"));
                assert!(message.contains("1"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_arity_checked_before_invocation() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let functions = FunctionRegistry::new();
        functions
            .register(Function::new("count", 1, Some(1), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }))
            .unwrap();

        let ctx = Context::new();
        assert!(eval_with("count()", &ctx, &functions).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(eval_with("count(1)", &ctx, &functions).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_function_timeout_is_resource_limit() {
        let functions = FunctionRegistry::new();
        functions
            .register(Function::new("slow", 0, Some(0), |_| {
                std::thread::sleep(Duration::from_millis(20));
                Ok(Value::Null)
            }))
            .unwrap();

        let expr = parse("slow()").unwrap();
        let err = Evaluator::new(&functions, Duration::from_millis(1), Position::start())
            .eval(&expr, &Context::new())
            .unwrap_err();
        assert!(matches!(
            err,
            PromptyError::ResourceLimit {
                limit: LimitKind::FunctionTimeout(_),
                ..
            }
        ));
        assert!(err.is_fatal());
    }
}
