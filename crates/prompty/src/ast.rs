/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template AST types.
//!
//! This module defines the abstract syntax tree for parsed templates.
//! Nodes own their children by value and each carries the [`Span`] of the
//! source it was parsed from, which the `keepraw` error strategy uses to
//! reproduce the original text of a failing tag.

use hashlink::LinkedHashMap;

use crate::expression::Expr;
use crate::position::{Position, Span};

/// A node in the template AST.
///
/// Comments are dropped by the parser and have no variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text to be output as-is.
    Text(Text),

    /// `{~name attr="v" /~}`, resolved by name at execution time.
    SelfClosingTag(Tag),

    /// `{~name~}...{~/name~}`, resolved by name at execution time.
    BlockTag(BlockTag),

    /// `{~prompty.if eval="..."~}...{~prompty.elseif~}...{~prompty.else~}...{~/prompty.if~}`
    Conditional(Conditional),

    /// `{~prompty.for item="x" in="items"~}...{~/prompty.for~}`
    Loop(Loop),

    /// `{~prompty.switch eval="..."~}{~prompty.case value="a"~}...{~/prompty.case~}...{~/prompty.switch~}`
    Switch(Switch),

    /// `{~prompty.raw~}...{~/prompty.raw~}`
    Raw(RawBlock),
}

impl Node {
    /// Source range of the whole node.
    pub fn span(&self) -> Span {
        match self {
            Node::Text(n) => n.span,
            Node::SelfClosingTag(n) => n.span,
            Node::BlockTag(n) => n.span,
            Node::Conditional(n) => n.span,
            Node::Loop(n) => n.span,
            Node::Switch(n) => n.span,
            Node::Raw(n) => n.span,
        }
    }

    pub fn position(&self) -> Position {
        self.span().start
    }
}

/// Literal text node.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    /// Text with escapes already processed.
    pub text: String,
    pub span: Span,
}

/// A self-closing tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub attributes: Attributes,
    pub span: Span,
}

/// A block tag with parsed children.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTag {
    pub name: String,
    pub attributes: Attributes,
    pub children: Vec<Node>,
    /// From the open tag through the matching close tag.
    pub span: Span,
}

/// An `eval` attribute compiled at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The attribute text as written.
    pub source: String,
    pub expr: Expr,
    /// Position of the tag carrying the attribute.
    pub position: Position,
}

/// Conditional chain.
///
/// The first branch comes from `if`, then one per `elseif`, then at most one
/// fallback branch (from `else`) with no condition, always last.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub branches: Vec<Branch>,
    /// Attributes of the opening `if` tag (`onerror`, `default`).
    pub attributes: Attributes,
    pub span: Span,
}

impl Conditional {
    pub fn has_fallback(&self) -> bool {
        self.branches.last().is_some_and(|b| b.condition.is_none())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// `None` for the `else` branch.
    pub condition: Option<Condition>,
    pub body: Vec<Node>,
}

/// Loop over a list or a map.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    /// Name the current element is bound to.
    pub item: String,
    /// Name the zero-based iteration index is bound to, if requested.
    pub index: Option<String>,
    /// Dotted path of the collection.
    pub collection: String,
    /// User-requested maximum number of iterations.
    pub limit: Option<usize>,
    pub body: Vec<Node>,
    pub attributes: Attributes,
    pub span: Span,
}

/// Switch with first-match-wins cases.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub condition: Condition,
    pub cases: Vec<Case>,
    /// Body of `casedefault`, which is unique and last when present.
    pub default: Option<Vec<Node>>,
    pub attributes: Attributes,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub matcher: CaseMatch,
    pub body: Vec<Node>,
    pub position: Position,
}

/// How a case decides whether it matches.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseMatch {
    /// Matches when the rendered switch value equals this text.
    Value(String),
    /// Matches when the expression is truthy.
    Eval(Condition),
}

/// Verbatim text from a raw block.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub text: String,
    pub span: Span,
}

/// Ordered attribute map of a tag.
///
/// Keys keep their source order, which validation and `keepraw` output rely
/// on for stable messages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes {
    entries: LinkedHashMap<String, String>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an attribute, returning the previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Builder form of [`Attributes::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Get an attribute, falling back to `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Interpret an attribute as a boolean flag (`"true"`, `"yes"`, `"1"`).
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(str::to_ascii_lowercase).as_deref(),
            Some("true" | "yes" | "1")
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_keep_source_order() {
        let attrs = Attributes::new()
            .with("name", "user")
            .with("default", "N/A")
            .with("onerror", "default");

        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["name", "default", "onerror"]);
        assert_eq!(attrs.len(), 3);
    }

    #[test]
    fn test_attribute_accessors() {
        let attrs: Attributes = [("name", "user"), ("isolate", "TRUE")].into_iter().collect();

        assert_eq!(attrs.get("name"), Some("user"));
        assert_eq!(attrs.get("missing"), None);
        assert_eq!(attrs.get_or("missing", "fallback"), "fallback");
        assert!(attrs.has("name"));
        assert!(!attrs.has("default"));
        assert!(attrs.flag("isolate"));
        assert!(!attrs.flag("name"));
        assert!(!attrs.flag("missing"));
    }

    #[test]
    fn test_insert_reports_previous_value() {
        let mut attrs = Attributes::new();
        assert_eq!(attrs.insert("a", "1"), None);
        assert_eq!(attrs.insert("a", "2"), Some("1".to_string()));
        assert_eq!(attrs.get("a"), Some("2"));
    }
}
