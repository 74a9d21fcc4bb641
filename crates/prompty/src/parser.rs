/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template parser.
//!
//! This module turns the token stream from the [lexer](crate::lexer) into the
//! template AST. Control-flow tags (`prompty.if`, `prompty.for`,
//! `prompty.switch` and their companions) are validated here; every other tag
//! name is kept structurally and resolved by name at execution time, so
//! resolvers may be registered after a template is parsed.
//!
//! Parsing is all-or-nothing: the first structural error aborts with a
//! position-carrying [`PromptyError::Parse`].

use std::sync::Arc;

use crate::ast::{
    Attributes, BlockTag, Branch, Case, CaseMatch, Condition, Conditional, Loop, Node, RawBlock,
    Switch, Tag, Text,
};
use crate::cancellation::Cancellation;
use crate::config::Delimiters;
use crate::context::Context;
use crate::engine::Engine;
use crate::error::{ParseErrorKind, PromptyError, PromptyResult};
use crate::expression;
use crate::lexer::{self, Token, TokenKind};
use crate::position::{Position, Span};
use crate::value::Value;

pub(crate) const TAG_IF: &str = "prompty.if";
pub(crate) const TAG_ELSEIF: &str = "prompty.elseif";
pub(crate) const TAG_ELSE: &str = "prompty.else";
pub(crate) const TAG_FOR: &str = "prompty.for";
pub(crate) const TAG_SWITCH: &str = "prompty.switch";
pub(crate) const TAG_CASE: &str = "prompty.case";
pub(crate) const TAG_CASEDEFAULT: &str = "prompty.casedefault";
pub(crate) const TAG_RAW: &str = "prompty.raw";
pub(crate) const TAG_COMMENT: &str = "prompty.comment";

/// Maximum number of blocks open at once.
pub(crate) const MAX_NESTING_DEPTH: usize = 64;

/// A parsed template ready for execution.
///
/// Templates are immutable once parsed and can be executed any number of
/// times, concurrently, against different data.
#[derive(Debug, Clone)]
pub struct Template {
    pub(crate) name: Option<String>,

    /// Original source, used by `keepraw` and for error reporting.
    pub(crate) source: Arc<str>,

    pub(crate) nodes: Vec<Node>,

    /// Engine whose registries and configuration execution uses.
    pub(crate) engine: Option<Engine>,
}

impl Template {
    /// Parse a template with the default `{~` / `~}` delimiters.
    pub fn parse(source: &str) -> PromptyResult<Self> {
        Self::parse_with_delimiters(source, &Delimiters::default())
    }

    /// Parse a template with custom delimiters.
    pub fn parse_with_delimiters(source: &str, delimiters: &Delimiters) -> PromptyResult<Self> {
        let tokens = lexer::tokenize(source, delimiters)?;
        let nodes = Parser::new(tokens, delimiters).parse_document()?;

        tracing::debug!(nodes = nodes.len(), bytes = source.len(), "Parsed template");

        Ok(Template {
            name: None,
            source: Arc::from(source),
            nodes,
            engine: None,
        })
    }

    /// Give the template a name, used in include chains and diagnostics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn bind(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get the AST nodes of this template.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn engine(&self) -> Engine {
        self.engine.clone().unwrap_or_else(Engine::shared_default)
    }

    /// Execute against `data`, which must be a map (or null for no data).
    pub fn execute(&self, cancel: &Cancellation, data: impl Into<Value>) -> PromptyResult<String> {
        let engine = self.engine();
        let ctx = Context::from_value(data)?
            .with_error_strategy(engine.config().default_error_strategy());
        engine.execute_template(self, cancel, &ctx)
    }

    /// Execute against a caller-built context.
    ///
    /// The context's error strategy is used as the default for every tag.
    pub fn execute_with_context(
        &self,
        cancel: &Cancellation,
        ctx: &Context<'_>,
    ) -> PromptyResult<String> {
        self.engine().execute_template(self, cancel, ctx)
    }
}

/// Parse `source` with the default delimiters.
pub fn parse(source: &str) -> PromptyResult<Template> {
    Template::parse(source)
}

/// Parse `source` with custom delimiters.
pub fn parse_with_delimiters(source: &str, delimiters: &Delimiters) -> PromptyResult<Template> {
    Template::parse_with_delimiters(source, delimiters)
}

/// An open tag as read from the token stream.
struct OpenTag {
    name: String,
    attributes: Attributes,
    start: Position,
    /// Byte offset just past the tag's closing marker.
    end: usize,
    self_closing: bool,
}

impl OpenTag {
    fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    fn require(&self, key: &str) -> PromptyResult<&str> {
        self.attributes.get(key).ok_or_else(|| {
            PromptyError::parse(
                ParseErrorKind::MissingAttribute,
                format!("`{}` requires the `{}` attribute", self.name, key),
                self.start,
            )
        })
    }

    fn require_block(&self) -> PromptyResult<()> {
        if self.self_closing {
            return Err(PromptyError::parse(
                ParseErrorKind::InvalidTagForm,
                format!("`{}` must be a block tag", self.name),
                self.start,
            ));
        }
        Ok(())
    }

    fn condition(&self) -> PromptyResult<Condition> {
        let source = self.require("eval")?;
        compile_condition(source, self.start)
    }
}

/// How a body ended.
enum BodyEnd {
    /// The matching close tag; carries the offset just past it.
    Close(usize),
    /// An `elseif`/`else` marker of the enclosing conditional.
    Branch(OpenTag),
}

struct Parser<'d> {
    tokens: Vec<Token>,
    pos: usize,
    delimiters: &'d Delimiters,
    /// Number of bodies currently being parsed.
    depth: usize,
}

impl<'d> Parser<'d> {
    fn new(tokens: Vec<Token>, delimiters: &'d Delimiters) -> Self {
        Self {
            tokens,
            pos: 0,
            delimiters,
            depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        // The lexer always ends the stream with `Eof`.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn close_tag_text(&self, name: &str) -> String {
        format!(
            "{}/{}{}",
            self.delimiters.open(),
            name,
            self.delimiters.close()
        )
    }

    fn parse_document(&mut self) -> PromptyResult<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Eof => return Ok(nodes),
                TokenKind::CloseTag => {
                    return Err(PromptyError::parse(
                        ParseErrorKind::UnexpectedCloseTag,
                        format!("`{}` has no matching open tag", token.lexeme),
                        token.position(),
                    ));
                }
                _ => {
                    if let Some(node) = self.parse_node(None)? {
                        nodes.push(node);
                    }
                }
            }
        }
    }

    /// Parse children until the close tag of `parent`.
    ///
    /// When `parent` is a conditional, `elseif`/`else` markers also end the
    /// body and are handed back to the caller.
    fn parse_body(&mut self, parent: &OpenTag) -> PromptyResult<(Vec<Node>, BodyEnd)> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(PromptyError::parse(
                ParseErrorKind::NestingTooDeep,
                format!(
                    "`{}` is nested more than {} blocks deep",
                    parent.name, MAX_NESTING_DEPTH
                ),
                parent.start,
            ));
        }
        self.depth += 1;
        let body = self.parse_body_nodes(parent);
        self.depth -= 1;
        body
    }

    fn parse_body_nodes(&mut self, parent: &OpenTag) -> PromptyResult<(Vec<Node>, BodyEnd)> {
        let mut nodes = Vec::new();
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Eof => {
                    return Err(PromptyError::parse(
                        ParseErrorKind::UnclosedTag,
                        format!(
                            "`{}` is never closed (expected `{}`)",
                            parent.name,
                            self.close_tag_text(&parent.name)
                        ),
                        parent.start,
                    ));
                }
                TokenKind::CloseTag => {
                    self.bump();
                    if token.lexeme != parent.name {
                        return Err(PromptyError::parse(
                            ParseErrorKind::MismatchedCloseTag,
                            format!(
                                "expected `{}` but found `{}`",
                                self.close_tag_text(&parent.name),
                                self.close_tag_text(&token.lexeme)
                            ),
                            token.position(),
                        ));
                    }
                    return Ok((nodes, BodyEnd::Close(token.span.end)));
                }
                TokenKind::TagOpen
                    if parent.name == TAG_IF
                        && (token.lexeme == TAG_ELSEIF || token.lexeme == TAG_ELSE) =>
                {
                    let marker = self.parse_open_tag()?;
                    return Ok((nodes, BodyEnd::Branch(marker)));
                }
                _ => {
                    if let Some(node) = self.parse_node(Some(parent))? {
                        nodes.push(node);
                    }
                }
            }
        }
    }

    /// Parse a text run or a tag. Returns `None` for nodes dropped at parse
    /// time (comments).
    fn parse_node(&mut self, parent: Option<&OpenTag>) -> PromptyResult<Option<Node>> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Text => {
                self.bump();
                Ok(Some(Node::Text(Text {
                    text: token.lexeme,
                    span: token.span,
                })))
            }
            TokenKind::TagOpen => {
                let tag = self.parse_open_tag()?;
                self.parse_tag(tag, parent)
            }
            _ => Err(PromptyError::parse(
                ParseErrorKind::InvalidTagForm,
                format!("unexpected `{}`", token.lexeme),
                token.position(),
            )),
        }
    }

    /// Read a tag name, its attributes, and its closing marker.
    fn parse_open_tag(&mut self) -> PromptyResult<OpenTag> {
        let open = self.bump();
        let start = open.position();
        let mut attributes = Attributes::new();

        loop {
            let token = self.bump();
            match token.kind {
                TokenKind::AttrKey => {
                    let value = self.bump();
                    if value.kind != TokenKind::AttrValue {
                        return Err(PromptyError::parse(
                            ParseErrorKind::InvalidAttribute,
                            format!("attribute `{}` has no value", token.lexeme),
                            token.position(),
                        ));
                    }
                    if attributes.insert(token.lexeme.clone(), value.lexeme).is_some() {
                        return Err(PromptyError::parse(
                            ParseErrorKind::DuplicateAttribute,
                            format!(
                                "attribute `{}` appears more than once on `{}`",
                                token.lexeme, open.lexeme
                            ),
                            token.position(),
                        ));
                    }
                }
                TokenKind::TagClose | TokenKind::SelfClose => {
                    return Ok(OpenTag {
                        name: open.lexeme,
                        attributes,
                        start,
                        end: token.span.end,
                        self_closing: token.kind == TokenKind::SelfClose,
                    });
                }
                _ => {
                    return Err(PromptyError::parse(
                        ParseErrorKind::InvalidTagForm,
                        format!("malformed tag `{}`", open.lexeme),
                        start,
                    ));
                }
            }
        }
    }

    fn parse_tag(&mut self, tag: OpenTag, parent: Option<&OpenTag>) -> PromptyResult<Option<Node>> {
        match tag.name.as_str() {
            TAG_COMMENT => {
                if !tag.self_closing {
                    self.parse_verbatim(&tag)?;
                }
                Ok(None)
            }
            TAG_RAW => {
                let (text, end) = if tag.self_closing {
                    (String::new(), tag.end)
                } else {
                    self.parse_verbatim(&tag)?
                };
                Ok(Some(Node::Raw(RawBlock {
                    text,
                    span: Span::new(tag.start, end),
                })))
            }
            TAG_IF => self.parse_conditional(tag).map(Some),
            TAG_FOR => self.parse_loop(tag).map(Some),
            TAG_SWITCH => self.parse_switch(tag).map(Some),
            TAG_ELSEIF | TAG_ELSE => {
                let context = match parent {
                    Some(p) => format!("inside `{}`", p.name),
                    None => "at the top level".to_string(),
                };
                Err(PromptyError::parse(
                    ParseErrorKind::MisplacedBranch,
                    format!("`{}` is not allowed {}; it must follow `{}`", tag.name, context, TAG_IF),
                    tag.start,
                ))
            }
            TAG_CASE | TAG_CASEDEFAULT => Err(PromptyError::parse(
                ParseErrorKind::MisplacedCase,
                format!("`{}` must be a direct child of `{}`", tag.name, TAG_SWITCH),
                tag.start,
            )),
            _ if tag.self_closing => Ok(Some(Node::SelfClosingTag(Tag {
                span: tag.span(),
                name: tag.name,
                attributes: tag.attributes,
            }))),
            _ => {
                let (children, end) = self.parse_block_body(&tag)?;
                Ok(Some(Node::BlockTag(BlockTag {
                    span: Span::new(tag.start, end),
                    name: tag.name,
                    attributes: tag.attributes,
                    children,
                })))
            }
        }
    }

    /// Body of a block that does not accept branch markers.
    fn parse_block_body(&mut self, tag: &OpenTag) -> PromptyResult<(Vec<Node>, usize)> {
        match self.parse_body(tag)? {
            (nodes, BodyEnd::Close(end)) => Ok((nodes, end)),
            // Only conditionals receive branch markers.
            (_, BodyEnd::Branch(marker)) => Err(PromptyError::parse(
                ParseErrorKind::MisplacedBranch,
                format!("`{}` is not allowed inside `{}`", marker.name, tag.name),
                marker.start,
            )),
        }
    }

    /// Raw and comment bodies arrive as one text token and a close tag.
    fn parse_verbatim(&mut self, tag: &OpenTag) -> PromptyResult<(String, usize)> {
        let mut text = String::new();
        if self.peek().kind == TokenKind::Text {
            text = self.bump().lexeme;
        }
        let close = self.bump();
        if close.kind != TokenKind::CloseTag || close.lexeme != tag.name {
            return Err(PromptyError::parse(
                ParseErrorKind::UnclosedTag,
                format!(
                    "`{}` is never closed (expected `{}`)",
                    tag.name,
                    self.close_tag_text(&tag.name)
                ),
                tag.start,
            ));
        }
        Ok((text, close.span.end))
    }

    fn parse_conditional(&mut self, tag: OpenTag) -> PromptyResult<Node> {
        tag.require_block()?;
        let mut branches = Vec::new();
        let mut condition = Some(tag.condition()?);

        loop {
            let (body, end) = self.parse_body(&tag)?;
            let has_condition = condition.is_some();
            branches.push(Branch { condition, body });

            let marker = match end {
                BodyEnd::Close(end) => {
                    return Ok(Node::Conditional(Conditional {
                        branches,
                        span: Span::new(tag.start, end),
                        attributes: tag.attributes,
                    }));
                }
                BodyEnd::Branch(marker) => marker,
            };

            if !has_condition {
                return Err(PromptyError::parse(
                    ParseErrorKind::MisplacedBranch,
                    format!("`{}` cannot follow `{}`", marker.name, TAG_ELSE),
                    marker.start,
                ));
            }

            condition = if marker.name == TAG_ELSE {
                if marker.attributes.has("eval") {
                    return Err(PromptyError::parse(
                        ParseErrorKind::ElseWithCondition,
                        format!("`{}` must not have an `eval` attribute", TAG_ELSE),
                        marker.start,
                    ));
                }
                None
            } else {
                Some(marker.condition()?)
            };
        }
    }

    fn parse_loop(&mut self, tag: OpenTag) -> PromptyResult<Node> {
        tag.require_block()?;
        let item = tag.require("item")?.to_string();
        let collection = tag.require("in")?.to_string();
        let index = tag.attributes.get("index").map(str::to_string);
        let limit = match tag.attributes.get("limit") {
            None => None,
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|_| {
                PromptyError::parse(
                    ParseErrorKind::InvalidAttribute,
                    format!("`limit` must be a non-negative integer, got \"{}\"", raw),
                    tag.start,
                )
            })?),
        };

        let (body, end) = self.parse_block_body(&tag)?;
        Ok(Node::Loop(Loop {
            item,
            index,
            collection,
            limit,
            body,
            span: Span::new(tag.start, end),
            attributes: tag.attributes,
        }))
    }

    fn parse_switch(&mut self, tag: OpenTag) -> PromptyResult<Node> {
        tag.require_block()?;
        let condition = tag.condition()?;
        let mut cases = Vec::new();
        let mut default: Option<Vec<Node>> = None;

        loop {
            let token = self.peek().clone();
            match token.kind {
                // Whitespace between cases is layout, not content.
                TokenKind::Text if token.lexeme.trim().is_empty() => {
                    self.bump();
                }
                TokenKind::TagOpen if token.lexeme == TAG_CASE || token.lexeme == TAG_CASEDEFAULT => {
                    let case_tag = self.parse_open_tag()?;
                    case_tag.require_block()?;
                    if default.is_some() {
                        return Err(PromptyError::parse(
                            ParseErrorKind::MisplacedDefault,
                            format!("`{}` must be the last child of `{}`", TAG_CASEDEFAULT, TAG_SWITCH),
                            case_tag.start,
                        ));
                    }

                    if case_tag.name == TAG_CASEDEFAULT {
                        let (body, _) = self.parse_block_body(&case_tag)?;
                        default = Some(body);
                        continue;
                    }

                    let matcher = match (case_tag.attributes.get("value"), case_tag.attributes.has("eval")) {
                        (Some(value), false) => CaseMatch::Value(value.to_string()),
                        (None, true) => CaseMatch::Eval(case_tag.condition()?),
                        _ => {
                            return Err(PromptyError::parse(
                                ParseErrorKind::AmbiguousCase,
                                format!(
                                    "`{}` needs exactly one of `value` or `eval`",
                                    TAG_CASE
                                ),
                                case_tag.start,
                            ));
                        }
                    };
                    let (body, _) = self.parse_block_body(&case_tag)?;
                    cases.push(Case {
                        matcher,
                        body,
                        position: case_tag.start,
                    });
                }
                TokenKind::CloseTag if token.lexeme == TAG_SWITCH => {
                    self.bump();
                    return Ok(Node::Switch(Switch {
                        condition,
                        cases,
                        default,
                        span: Span::new(tag.start, token.span.end),
                        attributes: tag.attributes,
                    }));
                }
                TokenKind::CloseTag => {
                    return Err(PromptyError::parse(
                        ParseErrorKind::MismatchedCloseTag,
                        format!(
                            "expected `{}` but found `{}`",
                            self.close_tag_text(TAG_SWITCH),
                            self.close_tag_text(&token.lexeme)
                        ),
                        token.position(),
                    ));
                }
                TokenKind::Eof => {
                    return Err(PromptyError::parse(
                        ParseErrorKind::UnclosedTag,
                        format!(
                            "`{}` is never closed (expected `{}`)",
                            TAG_SWITCH,
                            self.close_tag_text(TAG_SWITCH)
                        ),
                        tag.start,
                    ));
                }
                _ => {
                    return Err(PromptyError::parse(
                        ParseErrorKind::MisplacedCase,
                        format!(
                            "only `{}` and `{}` blocks may appear inside `{}`",
                            TAG_CASE, TAG_CASEDEFAULT, TAG_SWITCH
                        ),
                        token.position(),
                    ));
                }
            }
        }
    }
}

fn compile_condition(source: &str, position: Position) -> PromptyResult<Condition> {
    let expr = expression::parse(source).map_err(|e| {
        PromptyError::parse(
            ParseErrorKind::InvalidExpression,
            format!("invalid expression \"{}\": {}", source, e),
            position,
        )
    })?;
    Ok(Condition {
        source: source.to_string(),
        expr,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expr;

    fn parse_ok(source: &str) -> Vec<Node> {
        match parse(source) {
            Ok(t) => t.nodes,
            Err(e) => panic!("failed to parse {:?}: {}", source, e),
        }
    }

    fn parse_err(source: &str) -> ParseErrorKind {
        match parse(source) {
            Err(PromptyError::Parse { kind, .. }) => kind,
            Err(other) => panic!("expected a parse error, got {}", other),
            Ok(_) => panic!("expected {:?} to fail", source),
        }
    }

    // ========================================================================
    // Plain tags
    // ========================================================================

    #[test]
    fn test_text_and_self_closing_tag() {
        let nodes = parse_ok(r#"Hello, {~prompty.var name="user" /~}!"#);
        assert_eq!(nodes.len(), 3);
        match &nodes[1] {
            Node::SelfClosingTag(tag) => {
                assert_eq!(tag.name, "prompty.var");
                assert_eq!(tag.attributes.get("name"), Some("user"));
                assert_eq!(tag.span.start.offset, 7);
            }
            other => panic!("expected a tag, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_block_tag_is_kept() {
        let nodes = parse_ok("{~wrap~}a{~wrap~}b{~/wrap~}{~/wrap~}");
        let Node::BlockTag(outer) = &nodes[0] else {
            panic!("expected block tag");
        };
        assert_eq!(outer.name, "wrap");
        assert_eq!(outer.children.len(), 2);
        assert!(matches!(&outer.children[1], Node::BlockTag(inner) if inner.name == "wrap"));
        assert_eq!(outer.span.end, "{~wrap~}a{~wrap~}b{~/wrap~}{~/wrap~}".len());
    }

    #[test]
    fn test_duplicate_attribute() {
        assert_eq!(
            parse_err(r#"{~x a="1" a="2" /~}"#),
            ParseErrorKind::DuplicateAttribute
        );
    }

    #[test]
    fn test_unbalanced_tags() {
        assert_eq!(parse_err("{~a~}text"), ParseErrorKind::UnclosedTag);
        assert_eq!(parse_err("text{~/a~}"), ParseErrorKind::UnexpectedCloseTag);
        assert_eq!(parse_err("{~a~}{~b~}{~/a~}{~/b~}"), ParseErrorKind::MismatchedCloseTag);
    }

    #[test]
    fn test_error_position() {
        let err = parse("ok\n  {~a~}").unwrap_err();
        assert_eq!(err.position(), Some(Position::new(5, 2, 3)));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}{}", "{~w~}".repeat(20_000), "{~/w~}".repeat(20_000));
        let err = parse(&source).unwrap_err();
        assert!(matches!(
            err,
            PromptyError::Parse {
                kind: ParseErrorKind::NestingTooDeep,
                ..
            }
        ));
        // The innermost block that would exceed the limit
        let offset = MAX_NESTING_DEPTH * "{~w~}".len();
        assert_eq!(err.position(), Some(Position::new(offset, 1, offset + 1)));

        let source = "{~prompty.if eval=\"a\"~}".repeat(100) + &"{~/prompty.if~}".repeat(100);
        assert_eq!(parse_err(&source), ParseErrorKind::NestingTooDeep);
    }

    #[test]
    fn test_nesting_up_to_the_limit_parses() {
        let depth = MAX_NESTING_DEPTH;
        let source = format!("{}x{}", "{~w~}".repeat(depth), "{~/w~}".repeat(depth));
        assert_eq!(parse_ok(&source).len(), 1);
        // Siblings reuse the same depth
        let source = "{~w~}{~w~}a{~/w~}{~/w~}".repeat(500);
        assert_eq!(parse_ok(&source).len(), 500);
    }

    // ========================================================================
    // Raw and comment
    // ========================================================================

    #[test]
    fn test_comment_is_dropped() {
        let nodes = parse_ok("a{~prompty.comment~}hidden {~x /~}{~/prompty.comment~}b");
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| matches!(n, Node::Text(_))));
    }

    #[test]
    fn test_raw_block_is_verbatim() {
        let nodes = parse_ok(r#"{~prompty.raw~}{~prompty.var name="x" /~}{~/prompty.raw~}"#);
        match &nodes[0] {
            Node::Raw(raw) => assert_eq!(raw.text, r#"{~prompty.var name="x" /~}"#),
            other => panic!("expected raw, got {:?}", other),
        }
    }

    #[test]
    fn test_verbatim_close_tag_with_whitespace() {
        let nodes = parse_ok("{~prompty.raw~}x{~/prompty.raw ~}");
        assert!(matches!(&nodes[0], Node::Raw(raw) if raw.text == "x"));
        let nodes = parse_ok("a{~prompty.comment~}hidden{~/ prompty.comment ~}b");
        assert_eq!(nodes.len(), 2);
    }

    // ========================================================================
    // Conditionals
    // ========================================================================

    #[test]
    fn test_conditional_chain() {
        let nodes = parse_ok(
            r#"{~prompty.if eval="a"~}A{~prompty.elseif eval="b"~}B{~prompty.else /~}C{~/prompty.if~}"#,
        );
        let Node::Conditional(cond) = &nodes[0] else {
            panic!("expected conditional");
        };
        assert_eq!(cond.branches.len(), 3);
        assert_eq!(
            cond.branches[0].condition.as_ref().map(|c| &c.expr),
            Some(&Expr::Path("a".to_string()))
        );
        assert!(cond.has_fallback());
    }

    #[test]
    fn test_else_as_bare_open_tag() {
        let nodes = parse_ok(r#"{~prompty.if eval="n>0"~}pos{~prompty.else~}non-pos{~/prompty.if~}"#);
        let Node::Conditional(cond) = &nodes[0] else {
            panic!("expected conditional");
        };
        assert_eq!(cond.branches.len(), 2);
        assert!(cond.branches[1].condition.is_none());
    }

    #[test]
    fn test_conditional_errors() {
        assert_eq!(parse_err("{~prompty.if~}x{~/prompty.if~}"), ParseErrorKind::MissingAttribute);
        assert_eq!(
            parse_err(r#"{~prompty.if eval="a"~}{~prompty.else eval="b"~}{~/prompty.if~}"#),
            ParseErrorKind::ElseWithCondition
        );
        assert_eq!(
            parse_err(r#"{~prompty.if eval="a"~}{~prompty.else~}{~prompty.else~}{~/prompty.if~}"#),
            ParseErrorKind::MisplacedBranch
        );
        assert_eq!(
            parse_err(
                r#"{~prompty.if eval="a"~}{~prompty.else~}{~prompty.elseif eval="b"~}{~/prompty.if~}"#
            ),
            ParseErrorKind::MisplacedBranch
        );
        assert_eq!(parse_err("{~prompty.else~}"), ParseErrorKind::MisplacedBranch);
        assert_eq!(
            parse_err(r#"{~prompty.if eval="a +"~}{~/prompty.if~}"#),
            ParseErrorKind::InvalidExpression
        );
        assert_eq!(
            parse_err(r#"{~prompty.if eval="a" /~}"#),
            ParseErrorKind::InvalidTagForm
        );
    }

    #[test]
    fn test_else_inside_nested_block_is_misplaced() {
        assert_eq!(
            parse_err(r#"{~prompty.if eval="a"~}{~wrap~}{~prompty.else~}{~/wrap~}{~/prompty.if~}"#),
            ParseErrorKind::MisplacedBranch
        );
    }

    // ========================================================================
    // Loops
    // ========================================================================

    #[test]
    fn test_loop_attributes() {
        let nodes = parse_ok(
            r#"{~prompty.for item="x" index="i" in="data.items" limit="2"~}.{~/prompty.for~}"#,
        );
        let Node::Loop(l) = &nodes[0] else {
            panic!("expected loop");
        };
        assert_eq!(l.item, "x");
        assert_eq!(l.index.as_deref(), Some("i"));
        assert_eq!(l.collection, "data.items");
        assert_eq!(l.limit, Some(2));
    }

    #[test]
    fn test_loop_errors() {
        assert_eq!(
            parse_err(r#"{~prompty.for in="items"~}{~/prompty.for~}"#),
            ParseErrorKind::MissingAttribute
        );
        assert_eq!(
            parse_err(r#"{~prompty.for item="x" in="items" limit="-1"~}{~/prompty.for~}"#),
            ParseErrorKind::InvalidAttribute
        );
        assert_eq!(
            parse_err(r#"{~prompty.for item="x" in="items" limit="two"~}{~/prompty.for~}"#),
            ParseErrorKind::InvalidAttribute
        );
    }

    // ========================================================================
    // Switch
    // ========================================================================

    #[test]
    fn test_switch_structure() {
        let nodes = parse_ok(
            r#"{~prompty.switch eval="kind"~}
  {~prompty.case value="a"~}A{~/prompty.case~}
  {~prompty.case eval="kind == 'b'"~}B{~/prompty.case~}
  {~prompty.casedefault~}?{~/prompty.casedefault~}
{~/prompty.switch~}"#,
        );
        let Node::Switch(s) = &nodes[0] else {
            panic!("expected switch");
        };
        assert_eq!(s.cases.len(), 2);
        assert_eq!(s.cases[0].matcher, CaseMatch::Value("a".to_string()));
        assert!(matches!(s.cases[1].matcher, CaseMatch::Eval(_)));
        assert!(s.default.is_some());
    }

    #[test]
    fn test_switch_errors() {
        assert_eq!(
            parse_err(
                r#"{~prompty.switch eval="k"~}{~prompty.case value="a" eval="b"~}{~/prompty.case~}{~/prompty.switch~}"#
            ),
            ParseErrorKind::AmbiguousCase
        );
        assert_eq!(
            parse_err(
                r#"{~prompty.switch eval="k"~}{~prompty.case~}{~/prompty.case~}{~/prompty.switch~}"#
            ),
            ParseErrorKind::AmbiguousCase
        );
        assert_eq!(
            parse_err(
                r#"{~prompty.switch eval="k"~}{~prompty.casedefault~}{~/prompty.casedefault~}{~prompty.case value="a"~}{~/prompty.case~}{~/prompty.switch~}"#
            ),
            ParseErrorKind::MisplacedDefault
        );
        assert_eq!(
            parse_err(
                r#"{~prompty.switch eval="k"~}{~prompty.casedefault~}{~/prompty.casedefault~}{~prompty.casedefault~}{~/prompty.casedefault~}{~/prompty.switch~}"#
            ),
            ParseErrorKind::MisplacedDefault
        );
        assert_eq!(
            parse_err(r#"{~prompty.switch eval="k"~}text{~/prompty.switch~}"#),
            ParseErrorKind::MisplacedCase
        );
        assert_eq!(
            parse_err(r#"{~prompty.case value="a"~}{~/prompty.case~}"#),
            ParseErrorKind::MisplacedCase
        );
    }
}
