/*
 * executor.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template execution.
//!
//! The executor walks a template's AST depth-first against a [`Context`],
//! appending to an output buffer. It owns control flow (conditionals, loops,
//! switches, includes) and dispatches every other tag to the resolver bound
//! to its name.
//!
//! Recoverable failures (resolver and expression errors) are converted at the
//! failing tag according to the tag's `onerror` attribute or the context's
//! [`ErrorStrategy`]. Resource limits, circular includes and cancellation are
//! fatal and always propagate.

use std::time::Instant;

use crate::ast::{Attributes, BlockTag, CaseMatch, Condition, Conditional, Loop, Node, Switch, Tag};
use crate::cancellation::Cancellation;
use crate::config::Limits;
use crate::context::{Context, ErrorStrategy};
use crate::engine::Engine;
use crate::error::{LimitKind, PromptyError, PromptyResult, ResolveError};
use crate::expression::Evaluator;
use crate::logging::ErrorRecord;
use crate::parser::{TAG_FOR, TAG_IF, TAG_SWITCH, Template};
use crate::position::{Position, Span};
use crate::resolver::{CONTENT_ATTRIBUTE, TAG_INCLUDE};
use crate::value::Value;

/// Attributes of `prompty.include` that are not passed on as variables.
const INCLUDE_CONTROL_ATTRIBUTES: &[&str] = &[
    "template",
    "with",
    "isolate",
    "onerror",
    "default",
    CONTENT_ATTRIBUTE,
];

/// Execute `template` against `ctx`.
pub(crate) fn execute(
    engine: &Engine,
    template: &Template,
    cancel: &Cancellation,
    ctx: &Context<'_>,
) -> PromptyResult<String> {
    let limits = engine.config().limits();
    let started = Instant::now();
    let mut executor = Executor {
        engine,
        limits,
        cancel,
        deadline: started.checked_add(limits.execution_timeout),
        chain: template.name.iter().cloned().collect(),
        depth: 0,
    };

    tracing::debug!(
        template = template.name().unwrap_or("<anonymous>"),
        strategy = %ctx.error_strategy(),
        "Executing template"
    );

    executor.check_cancelled(Position::start())?;
    let root = ctx.child().with_cancellation(cancel.clone());
    let mut out = String::new();
    executor.render_nodes(&template.nodes, &root, &template.source, &mut out)?;

    tracing::debug!(
        bytes = out.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Execution finished"
    );
    Ok(out)
}

/// The tag whose failure is being recovered.
struct Site<'a> {
    tag: &'a str,
    attributes: &'a Attributes,
    span: Span,
}

struct Executor<'e> {
    engine: &'e Engine,
    limits: &'e Limits,
    cancel: &'e Cancellation,
    deadline: Option<Instant>,
    /// Names of the templates currently being rendered, outermost first.
    chain: Vec<String>,
    /// Number of includes currently being rendered.
    depth: usize,
}

impl<'e> Executor<'e> {
    fn render_nodes(
        &mut self,
        nodes: &[Node],
        ctx: &Context<'_>,
        source: &str,
        out: &mut String,
    ) -> PromptyResult<()> {
        for node in nodes {
            self.render_node(node, ctx, source, out)?;
        }
        Ok(())
    }

    fn render_node(
        &mut self,
        node: &Node,
        ctx: &Context<'_>,
        source: &str,
        out: &mut String,
    ) -> PromptyResult<()> {
        self.check_deadline(node.position())?;

        match node {
            Node::Text(text) => self.emit(out, &text.text, text.span.start),

            Node::Raw(raw) => self.emit(out, &raw.text, raw.span.start),

            Node::SelfClosingTag(tag) if tag.name == TAG_INCLUDE => {
                self.render_include(&tag.attributes, None, tag.span, ctx, source, out)
            }

            Node::SelfClosingTag(Tag {
                name,
                attributes,
                span,
            }) => self.render_tag(name, attributes, None, *span, ctx, source, out),

            Node::BlockTag(BlockTag {
                name,
                attributes,
                children,
                span,
            }) => {
                if name == TAG_INCLUDE {
                    self.render_include(attributes, Some(children.as_slice()), *span, ctx, source, out)
                } else {
                    self.render_tag(name, attributes, Some(children.as_slice()), *span, ctx, source, out)
                }
            }

            Node::Conditional(conditional) => {
                self.render_conditional(conditional, ctx, source, out)
            }

            Node::Loop(l) => self.render_loop(l, ctx, source, out),

            Node::Switch(switch) => self.render_switch(switch, ctx, source, out),
        }
    }

    // ========================================================================
    // Resolver tags
    // ========================================================================

    fn render_tag(
        &mut self,
        name: &str,
        attributes: &Attributes,
        children: Option<&[Node]>,
        span: Span,
        ctx: &Context<'_>,
        source: &str,
        out: &mut String,
    ) -> PromptyResult<()> {
        let position = span.start;
        let site = Site {
            tag: name,
            attributes,
            span,
        };

        let Some(resolver) = self.engine.resolvers().get(name) else {
            let err = resolver_error(name, position, ResolveError::UnknownTag(name.to_string()));
            return self.recover(err, &site, ctx, source, out);
        };

        // Block content is rendered first and handed to the resolver.
        let with_content;
        let attributes = match children {
            Some(children) => {
                let mut content = String::new();
                self.render_nodes(children, ctx, source, &mut content)?;
                with_content = attributes.clone().with(CONTENT_ATTRIBUTE, content);
                &with_content
            }
            None => attributes,
        };

        if let Err(source_err) = resolver.validate(attributes) {
            let err = resolver_error(name, position, source_err);
            return self.recover(err, &site, ctx, source, out);
        }

        self.check_cancelled(position)?;
        self.check_deadline(position)?;

        let started = Instant::now();
        let result = resolver.resolve(ctx, attributes);
        if started.elapsed() > self.limits.resolver_timeout {
            return Err(PromptyError::ResourceLimit {
                limit: LimitKind::ResolverTimeout(self.limits.resolver_timeout),
                position,
            });
        }

        match result {
            Ok(text) => self.emit(out, &text, position),
            Err(source_err) => {
                let err = resolver_error(name, position, source_err);
                self.recover(err, &site, ctx, source, out)
            }
        }
    }

    // ========================================================================
    // Include
    // ========================================================================

    fn render_include(
        &mut self,
        attributes: &Attributes,
        children: Option<&[Node]>,
        span: Span,
        ctx: &Context<'_>,
        source: &str,
        out: &mut String,
    ) -> PromptyResult<()> {
        let position = span.start;
        let site = Site {
            tag: TAG_INCLUDE,
            attributes,
            span,
        };
        self.check_cancelled(position)?;

        let Some(name) = attributes.get("template") else {
            let err = resolver_error(
                TAG_INCLUDE,
                position,
                ResolveError::MissingAttribute("template".to_string()),
            );
            return self.recover(err, &site, ctx, source, out);
        };

        // Both checks happen before descending.
        if self.chain.iter().any(|entry| entry == name) {
            let mut chain = self.chain.clone();
            chain.push(name.to_string());
            return Err(PromptyError::CircularInclude {
                name: name.to_string(),
                chain,
                position,
            });
        }
        let depth = self.depth + 1;
        if depth > self.limits.max_depth {
            return Err(PromptyError::ResourceLimit {
                limit: LimitKind::MaxDepth(self.limits.max_depth),
                position,
            });
        }

        let Some(template) = self.engine.templates().get(name) else {
            let err = resolver_error(
                TAG_INCLUDE,
                position,
                ResolveError::TemplateNotFound(name.to_string()),
            );
            return self.recover(err, &site, ctx, source, out);
        };

        let mut bindings = match attributes.get("with") {
            None => Default::default(),
            Some(path) => match ctx.get(path) {
                Some(Value::Map(map)) => map.clone(),
                Some(other) => {
                    let err = resolver_error(
                        TAG_INCLUDE,
                        position,
                        ResolveError::InvalidAttribute {
                            name: "with".to_string(),
                            message: format!("`{}` is a {}, not a map", path, other.type_name()),
                        },
                    );
                    return self.recover(err, &site, ctx, source, out);
                }
                None => {
                    let err = resolver_error(
                        TAG_INCLUDE,
                        position,
                        ResolveError::VariableNotFound(path.to_string()),
                    );
                    return self.recover(err, &site, ctx, source, out);
                }
            },
        };
        for (key, value) in attributes.iter() {
            if !INCLUDE_CONTROL_ATTRIBUTES.contains(&key) {
                bindings.insert(key.to_string(), Value::from(value));
            }
        }
        if let Some(children) = children {
            let mut content = String::new();
            self.render_nodes(children, ctx, source, &mut content)?;
            bindings.insert(CONTENT_ATTRIBUTE.to_string(), Value::String(content));
        }

        let child = if attributes.flag("isolate") {
            ctx.isolated(bindings)
        } else {
            let mut child = ctx.child();
            for (key, value) in bindings {
                child.set(key, value);
            }
            child
        };

        tracing::debug!(template = name, depth, "Entering include");

        self.chain.push(name.to_string());
        self.depth = depth;
        let mut buffer = String::new();
        let result = self.render_nodes(&template.nodes, &child, &template.source, &mut buffer);
        self.depth -= 1;
        self.chain.pop();
        result?;

        self.emit(out, &buffer, position)
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    fn render_conditional(
        &mut self,
        conditional: &Conditional,
        ctx: &Context<'_>,
        source: &str,
        out: &mut String,
    ) -> PromptyResult<()> {
        let site = Site {
            tag: TAG_IF,
            attributes: &conditional.attributes,
            span: conditional.span,
        };

        for branch in &conditional.branches {
            let taken = match &branch.condition {
                None => true,
                Some(condition) => match self.eval_condition(condition, ctx) {
                    Ok(taken) => taken,
                    Err(err) => return self.recover(err, &site, ctx, source, out),
                },
            };
            if taken {
                return self.render_nodes(&branch.body, ctx, source, out);
            }
        }
        Ok(())
    }

    fn render_loop(
        &mut self,
        l: &Loop,
        ctx: &Context<'_>,
        source: &str,
        out: &mut String,
    ) -> PromptyResult<()> {
        let position = l.span.start;
        let site = Site {
            tag: TAG_FOR,
            attributes: &l.attributes,
            span: l.span,
        };

        let items: Box<dyn Iterator<Item = Value> + '_> = match ctx.get(&l.collection) {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::List(items)) => Box::new(items.iter().cloned()),
            Some(Value::Map(map)) => Box::new(map.iter().map(|(key, value)| {
                let mut entry = std::collections::BTreeMap::new();
                entry.insert("key".to_string(), Value::from(key.as_str()));
                entry.insert("value".to_string(), value.clone());
                Value::Map(entry)
            })),
            Some(other) => {
                let err = resolver_error(
                    TAG_FOR,
                    position,
                    ResolveError::InvalidAttribute {
                        name: "in".to_string(),
                        message: format!(
                            "`{}` is a {}, not a list or map",
                            l.collection,
                            other.type_name()
                        ),
                    },
                );
                return self.recover(err, &site, ctx, source, out);
            }
        };

        let ceiling = self.limits.max_loop_iterations;
        for (index, item) in items.enumerate() {
            if l.limit.is_some_and(|limit| index >= limit) {
                break;
            }
            if index >= ceiling {
                return Err(PromptyError::ResourceLimit {
                    limit: LimitKind::MaxLoopIterations(ceiling),
                    position,
                });
            }
            self.check_cancelled(position)?;
            self.check_deadline(position)?;

            let mut child = ctx.child();
            child.set(l.item.as_str(), item);
            if let Some(index_name) = &l.index {
                child.set(index_name.as_str(), index);
            }
            self.render_nodes(&l.body, &child, source, out)?;
        }
        Ok(())
    }

    fn render_switch(
        &mut self,
        switch: &Switch,
        ctx: &Context<'_>,
        source: &str,
        out: &mut String,
    ) -> PromptyResult<()> {
        let site = Site {
            tag: TAG_SWITCH,
            attributes: &switch.attributes,
            span: switch.span,
        };

        let value = match self.evaluator(&switch.condition).eval(&switch.condition.expr, ctx) {
            Ok(value) => value.render(),
            Err(err) => return self.recover(err, &site, ctx, source, out),
        };

        for case in &switch.cases {
            let matched = match &case.matcher {
                CaseMatch::Value(expected) => *expected == value,
                CaseMatch::Eval(condition) => match self.eval_condition(condition, ctx) {
                    Ok(matched) => matched,
                    Err(err) => return self.recover(err, &site, ctx, source, out),
                },
            };
            if matched {
                return self.render_nodes(&case.body, ctx, source, out);
            }
        }

        match &switch.default {
            Some(body) => self.render_nodes(body, ctx, source, out),
            None => Ok(()),
        }
    }

    fn evaluator(&self, condition: &Condition) -> Evaluator<'e> {
        Evaluator::new(
            self.engine.functions(),
            self.limits.function_timeout,
            condition.position,
        )
    }

    fn eval_condition(&self, condition: &Condition, ctx: &Context<'_>) -> PromptyResult<bool> {
        self.evaluator(condition).eval_truthy(&condition.expr, ctx)
    }

    // ========================================================================
    // Error strategies
    // ========================================================================

    /// Apply the error strategy for `site` to a failure.
    fn recover(
        &self,
        err: PromptyError,
        site: &Site<'_>,
        ctx: &Context<'_>,
        source: &str,
        out: &mut String,
    ) -> PromptyResult<()> {
        if err.is_fatal() {
            return Err(err);
        }

        let position = site.span.start;
        match self.strategy_for(site, ctx) {
            ErrorStrategy::Throw => Err(err),
            ErrorStrategy::Default => {
                let fallback = site.attributes.get_or("default", "");
                self.emit(out, fallback, position)
            }
            ErrorStrategy::Remove => Ok(()),
            ErrorStrategy::KeepRaw => self.emit(out, site.span.slice(source), position),
            ErrorStrategy::Log => {
                self.engine.config().logger().log_error(&ErrorRecord {
                    tag: site.tag.to_string(),
                    position,
                    message: err.to_string(),
                    source_text: site.span.slice(source).to_string(),
                });
                Ok(())
            }
        }
    }

    /// The tag's `onerror` override, or the inherited strategy.
    fn strategy_for(&self, site: &Site<'_>, ctx: &Context<'_>) -> ErrorStrategy {
        match site.attributes.get("onerror") {
            None => ctx.error_strategy(),
            Some(raw) => raw.parse().unwrap_or_else(|reason: String| {
                tracing::warn!(
                    tag = site.tag,
                    line = site.span.start.line,
                    column = site.span.start.column,
                    %reason,
                    "Invalid onerror value, using inherited strategy"
                );
                ctx.error_strategy()
            }),
        }
    }

    // ========================================================================
    // Limits
    // ========================================================================

    fn emit(&self, out: &mut String, text: &str, position: Position) -> PromptyResult<()> {
        if out.len() + text.len() > self.limits.max_output_bytes {
            return Err(PromptyError::ResourceLimit {
                limit: LimitKind::MaxOutputBytes(self.limits.max_output_bytes),
                position,
            });
        }
        out.push_str(text);
        Ok(())
    }

    fn check_cancelled(&self, position: Position) -> PromptyResult<()> {
        if self.cancel.is_cancelled() {
            tracing::debug!(line = position.line, column = position.column, "Execution cancelled");
            return Err(PromptyError::Cancelled { position });
        }
        Ok(())
    }

    fn check_deadline(&self, position: Position) -> PromptyResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() > deadline => Err(PromptyError::ResourceLimit {
                limit: LimitKind::ExecutionTimeout(self.limits.execution_timeout),
                position,
            }),
            _ => Ok(()),
        }
    }
}

fn resolver_error(tag: &str, position: Position, source: ResolveError) -> PromptyError {
    PromptyError::Resolver {
        tag: tag.to_string(),
        position,
        source,
    }
}
