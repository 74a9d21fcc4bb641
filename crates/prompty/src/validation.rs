/*
 * validation.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Non-executing template checks.
//!
//! Validation parses a template and walks the tree against the engine's
//! current registries without running anything. It reports problems that
//! execution would hit (failing resolver validation, wrong function arity)
//! and things that merely look suspicious (tags with no resolver yet,
//! includes of unregistered templates).

use std::fmt;

use serde::Serialize;

use crate::ast::{Attributes, CaseMatch, Condition, Node};
use crate::context::ErrorStrategy;
use crate::engine::Engine;
use crate::parser::Template;
use crate::position::Position;
use crate::resolver::{CONTENT_ATTRIBUTE, TAG_INCLUDE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    pub position: Position,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.position, self.severity, self.message)
    }
}

/// Ordered list of findings from [`Engine::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    issues: Vec<Issue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, severity: Severity, message: impl Into<String>, position: Position) {
        self.issues.push(Issue {
            severity,
            message: message.into(),
            position,
        });
    }

    pub fn error_at(&mut self, message: impl Into<String>, position: Position) {
        self.add(Severity::Error, message, position);
    }

    pub fn warn_at(&mut self, message: impl Into<String>, position: Position) {
        self.add(Severity::Warning, message, position);
    }

    pub fn info_at(&mut self, message: impl Into<String>, position: Position) {
        self.add(Severity::Info, message, position);
    }

    /// All issues, in the order they were found.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.with_severity(Severity::Warning)
    }

    pub fn infos(&self) -> impl Iterator<Item = &Issue> {
        self.with_severity(Severity::Info)
    }

    fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    /// Check if any errors were collected (warnings don't count).
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    /// Valid means no errors; warnings and infos are allowed.
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

/// Validate `source` against `engine`'s registries.
pub(crate) fn validate(engine: &Engine, source: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    let template = match Template::parse_with_delimiters(source, engine.config().delimiters()) {
        Ok(template) => template,
        Err(err) => {
            let position = err.position().unwrap_or_default();
            result.error_at(err.to_string(), position);
            return result;
        }
    };

    let mut validator = Validator {
        engine,
        result: &mut result,
    };
    validator.visit_nodes(template.nodes());

    tracing::debug!(issues = result.len(), "Validated template");
    result
}

struct Validator<'a> {
    engine: &'a Engine,
    result: &'a mut ValidationResult,
}

impl Validator<'_> {
    fn visit_nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.visit_node(node);
        }
    }

    fn visit_node(&mut self, node: &Node) {
        match node {
            Node::Text(_) => {}

            Node::Raw(raw) => {
                let open = self.engine.config().delimiters().open();
                if raw.text.contains(open) {
                    self.result.info_at(
                        format!(
                            "raw block contains `{}`; it is emitted verbatim, not executed",
                            open
                        ),
                        raw.span.start,
                    );
                }
            }

            Node::SelfClosingTag(tag) => {
                self.check_tag(&tag.name, &tag.attributes, false, tag.span.start);
            }

            Node::BlockTag(block) => {
                self.check_tag(&block.name, &block.attributes, true, block.span.start);
                self.visit_nodes(&block.children);
            }

            Node::Conditional(conditional) => {
                self.check_onerror(&conditional.attributes, conditional.span.start);
                for branch in &conditional.branches {
                    if let Some(condition) = &branch.condition {
                        self.check_condition(condition);
                    }
                    self.visit_nodes(&branch.body);
                }
            }

            Node::Loop(l) => {
                self.check_onerror(&l.attributes, l.span.start);
                self.visit_nodes(&l.body);
            }

            Node::Switch(switch) => {
                self.check_onerror(&switch.attributes, switch.span.start);
                self.check_condition(&switch.condition);
                for case in &switch.cases {
                    if let CaseMatch::Eval(condition) = &case.matcher {
                        self.check_condition(condition);
                    }
                    self.visit_nodes(&case.body);
                }
                if let Some(default) = &switch.default {
                    self.visit_nodes(default);
                }
            }
        }
    }

    fn check_tag(&mut self, name: &str, attributes: &Attributes, block: bool, position: Position) {
        self.check_onerror(attributes, position);

        if name == TAG_INCLUDE {
            match attributes.get("template") {
                None => self.result.error_at(
                    format!("`{}` requires the `template` attribute", TAG_INCLUDE),
                    position,
                ),
                Some(template) if !self.engine.has_template(template) => self.result.warn_at(
                    format!("template `{}` is not registered", template),
                    position,
                ),
                Some(_) => {}
            }
            return;
        }

        let Some(resolver) = self.engine.resolvers().get(name) else {
            self.result.warn_at(
                format!("no resolver is registered for tag `{}`", name),
                position,
            );
            return;
        };

        let checked;
        let attributes = if block {
            checked = attributes.clone().with(CONTENT_ATTRIBUTE, "");
            &checked
        } else {
            attributes
        };
        if let Err(err) = resolver.validate(attributes) {
            self.result
                .error_at(format!("tag `{}`: {}", name, err), position);
        }
    }

    fn check_onerror(&mut self, attributes: &Attributes, position: Position) {
        if let Some(Err(reason)) = attributes.get("onerror").map(str::parse::<ErrorStrategy>) {
            self.result.error_at(reason, position);
        }
    }

    fn check_condition(&mut self, condition: &Condition) {
        for (name, args) in condition.expr.called_functions() {
            match self.engine.functions().get(name) {
                None => self.result.warn_at(
                    format!("unknown function `{}` in \"{}\"", name, condition.source),
                    condition.position,
                ),
                Some(function) if !function.accepts(args) => self.result.error_at(
                    format!(
                        "function `{}` expects {} argument(s), got {}",
                        name,
                        function.arity(),
                        args
                    ),
                    condition.position,
                ),
                Some(_) => {}
            }
        }
    }
}
