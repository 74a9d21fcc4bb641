/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template lexer.
//!
//! Splits template source into a flat token stream. With the default
//! delimiters the recognized forms are:
//!
//! - literal text
//! - `{~name key="value" ~}`: tag open (`TagOpen`, attribute pairs, `TagClose`)
//! - `{~name key="value" /~}`: self-closing tag (ends with `SelfClose`)
//! - `{~/name~}`: close tag (`CloseTag`)
//! - `\{~`: escape producing a literal `{~` in the surrounding text
//!
//! The bodies of verbatim tags (`prompty.raw`, `prompty.comment`) are not
//! tokenized: everything up to the matching close tag becomes one `Text`
//! token.

use crate::config::Delimiters;
use crate::error::{PromptyError, PromptyResult};
use crate::position::{Position, Span};

/// Tags whose bodies are captured verbatim.
pub(crate) const VERBATIM_TAGS: &[&str] = &["prompty.raw", "prompty.comment"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    TagOpen,
    AttrKey,
    AttrValue,
    TagClose,
    SelfClose,
    CloseTag,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Text for `Text`, the tag name for `TagOpen`/`CloseTag`, the unescaped
    /// key or value for attributes, the marker itself otherwise.
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn position(&self) -> Position {
        self.span.start
    }
}

/// Tokenize `source` using `delimiters`.
pub fn tokenize(source: &str, delimiters: &Delimiters) -> PromptyResult<Vec<Token>> {
    Lexer::new(source, delimiters).run()
}

struct Lexer<'a> {
    source: &'a str,
    open: &'a str,
    close: &'a str,
    self_close: String,
    close_tag_start: String,
    escape: String,
    offset: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, delimiters: &'a Delimiters) -> Self {
        let open = delimiters.open();
        let close = delimiters.close();
        Self {
            source,
            open,
            close,
            self_close: format!("/{}", close),
            close_tag_start: format!("{}/", open),
            escape: format!("\\{}", open),
            offset: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn position(&self) -> Position {
        Position::new(self.offset, self.line, self.column)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    fn at_end(&self) -> bool {
        self.offset >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Move forward `len` bytes, keeping line and column in step.
    fn advance(&mut self, len: usize) {
        let consumed = &self.source[self.offset..self.offset + len];
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset += len;
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, start: Position) {
        self.tokens.push(Token {
            kind,
            lexeme: lexeme.into(),
            span: Span::new(start, self.offset),
        });
    }

    fn run(mut self) -> PromptyResult<Vec<Token>> {
        while !self.at_end() {
            if self.rest().starts_with(self.open) {
                self.lex_tag()?;
            } else {
                self.lex_text();
            }
        }
        let end = self.position();
        self.push(TokenKind::Eof, "", end);
        Ok(self.tokens)
    }

    /// Consume a run of literal text up to the next tag opening.
    fn lex_text(&mut self) {
        let start = self.position();
        let mut text = String::new();

        while !self.at_end() {
            let rest = self.rest();
            if rest.starts_with(self.escape.as_str()) {
                text.push_str(self.open);
                self.advance(self.escape.len());
                continue;
            }
            if rest.starts_with(self.open) {
                break;
            }

            // Jump to the next interesting byte in one step.
            let next = next_boundary(rest, self.open).max(1);
            let next = ceil_char_boundary(rest, next);
            text.push_str(&rest[..next]);
            self.advance(next);
        }

        self.push(TokenKind::Text, text, start);
    }

    fn lex_tag(&mut self) -> PromptyResult<()> {
        let start = self.position();

        if self.rest().starts_with(self.close_tag_start.as_str()) {
            self.advance(self.close_tag_start.len());
            self.skip_whitespace();
            let name = self.lex_name();
            if name.is_empty() {
                return Err(self.error("expected tag name after `/`", start));
            }
            self.skip_whitespace();
            if !self.rest().starts_with(self.close) {
                if self.at_end() {
                    return Err(self.error(format!("unterminated close tag `{}`", name), start));
                }
                return Err(self.error(
                    format!("expected `{}` to end close tag `{}`", self.close, name),
                    start,
                ));
            }
            self.advance(self.close.len());
            self.push(TokenKind::CloseTag, name, start);
            return Ok(());
        }

        self.advance(self.open.len());
        self.skip_whitespace();
        let name = self.lex_name();
        if name.is_empty() {
            if self.at_end() {
                return Err(self.error("unterminated tag", start));
            }
            return Err(self.error("expected tag name", start));
        }
        self.push(TokenKind::TagOpen, name.clone(), start);

        loop {
            self.skip_whitespace();
            if self.at_end() {
                return Err(self.error(format!("unterminated tag `{}`", name), start));
            }

            let marker_start = self.position();
            if self.rest().starts_with(self.self_close.as_str()) {
                self.advance(self.self_close.len());
                let marker = self.self_close.clone();
                self.push(TokenKind::SelfClose, marker, marker_start);
                return Ok(());
            }
            if self.rest().starts_with(self.close) {
                self.advance(self.close.len());
                self.push(TokenKind::TagClose, self.close, marker_start);
                if VERBATIM_TAGS.contains(&name.as_str()) {
                    self.lex_verbatim_body(&name, start)?;
                }
                return Ok(());
            }

            self.lex_attribute(&name, start)?;
        }
    }

    fn lex_attribute(&mut self, tag: &str, tag_start: Position) -> PromptyResult<()> {
        let key_start = self.position();
        let key = self.lex_name();
        if key.is_empty() {
            let c = self.peek().unwrap_or(' ');
            return Err(self.error(
                format!("unexpected character `{}` in tag `{}`", c, tag),
                key_start,
            ));
        }
        self.push(TokenKind::AttrKey, key.clone(), key_start);

        self.skip_whitespace();
        if self.peek() != Some('=') {
            if self.at_end() {
                return Err(self.error(format!("unterminated tag `{}`", tag), tag_start));
            }
            return Err(self.error(
                format!("expected `=` after attribute `{}`", key),
                self.position(),
            ));
        }
        self.advance(1);
        self.skip_whitespace();

        let value_start = self.position();
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            None => return Err(self.error(format!("unterminated tag `{}`", tag), tag_start)),
            Some(_) => {
                return Err(self.error(
                    format!("value of attribute `{}` must be quoted", key),
                    value_start,
                ));
            }
        };
        self.advance(1);

        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error(format!("unterminated tag `{}`", tag), tag_start));
            };
            if c == quote {
                self.advance(1);
                break;
            }
            if c == '\\' {
                let mut chars = self.rest().chars();
                chars.next();
                match chars.next() {
                    Some(escaped @ ('"' | '\'' | '\\')) => {
                        value.push(escaped);
                        self.advance(2);
                        continue;
                    }
                    _ => {}
                }
            }
            value.push(c);
            self.advance(c.len_utf8());
        }

        self.push(TokenKind::AttrValue, value, value_start);
        Ok(())
    }

    /// Capture everything up to `{~/name~}` as one text token. The close tag
    /// may carry whitespace around its name.
    fn lex_verbatim_body(&mut self, name: &str, tag_start: Position) -> PromptyResult<()> {
        let rest = self.rest();
        let mut from = 0;
        let (len, terminator_len) = loop {
            let Some(found) = rest[from..].find(self.close_tag_start.as_str()) else {
                return Err(self.error(format!("unterminated `{}` block", name), tag_start));
            };
            let at = from + found;
            if let Some(terminator_len) = self.close_tag_len(&rest[at..], name) {
                break (at, terminator_len);
            }
            from = at + self.close_tag_start.len();
        };

        let body_start = self.position();
        let body = &self.source[self.offset..self.offset + len];
        self.advance(len);
        self.push(TokenKind::Text, body, body_start);
        let close_start = self.position();
        self.advance(terminator_len);
        self.push(TokenKind::CloseTag, name, close_start);
        Ok(())
    }

    /// Length of the close tag for `name` at the start of `text`, allowing
    /// the same whitespace `lex_tag` does.
    fn close_tag_len(&self, text: &str, name: &str) -> Option<usize> {
        let after_start = text.strip_prefix(self.close_tag_start.as_str())?;
        let after_name = after_start.trim_start().strip_prefix(name)?;
        if after_name.starts_with(is_name_char) {
            return None;
        }
        let after_close = after_name.trim_start().strip_prefix(self.close)?;
        Some(text.len() - after_close.len())
    }

    fn skip_whitespace(&mut self) {
        let len = self.rest().len() - self.rest().trim_start().len();
        self.advance(len);
    }

    fn lex_name(&mut self) -> String {
        let len = self
            .rest()
            .char_indices()
            .find(|(_, c)| !is_name_char(*c))
            .map_or(self.rest().len(), |(i, _)| i);
        let name = self.rest()[..len].to_string();
        self.advance(len);
        name
    }

    fn error(&self, message: impl Into<String>, position: Position) -> PromptyError {
        PromptyError::Lex {
            message: message.into(),
            position,
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Byte index of the next `\` or delimiter start in `text`.
fn next_boundary(text: &str, open: &str) -> usize {
    let first = open.as_bytes()[0];
    text.bytes()
        .position(|b| b == b'\\' || b == first)
        .unwrap_or(text.len())
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
