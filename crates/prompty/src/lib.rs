/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Prompt templating engine.
//!
//! Templates are plain text with tags written between configurable
//! delimiters (`{~` and `~}` by default):
//!
//! - Self-closing tags: `{~prompty.var name="user.name" /~}`
//! - Block tags: `{~shout~}hello{~/shout~}`
//! - Conditionals: `{~prompty.if eval="n > 0"~}...{~prompty.elseif eval="..."~}...{~prompty.else~}...{~/prompty.if~}`
//! - Loops over lists and maps: `{~prompty.for item="x" index="i" in="items" limit="5"~}...{~/prompty.for~}`
//! - Switches: `{~prompty.switch eval="kind"~}{~prompty.case value="a"~}...{~/prompty.case~}{~prompty.casedefault~}...{~/prompty.casedefault~}{~/prompty.switch~}`
//! - Includes of named templates: `{~prompty.include template="header" /~}`
//! - Verbatim blocks and comments: `{~prompty.raw~}...{~/prompty.raw~}`, `{~prompty.comment~}...{~/prompty.comment~}`
//! - Escapes: `\{~` renders a literal `{~`
//!
//! Every tag outside the control-flow set is handled by a [`Resolver`]
//! looked up by name at execution time. `eval` attributes use a small
//! expression language (comparisons, `&&`, `||`, `!`, and calls to
//! registered [`Function`]s) that has no access to anything but the
//! execution data.
//!
//! Failing tags are handled by a per-tag error strategy
//! (`onerror="throw|default|remove|keepraw|log"`). Resource limits,
//! circular includes and cancellation always abort execution.
//!
//! # Example
//!
//! ```ignore
//! use prompty::{Cancellation, Engine};
//!
//! let engine = Engine::new();
//! let output = engine.execute(
//!     &Cancellation::new(),
//!     r#"Hello, {~prompty.var name="user" /~}!"#,
//!     serde_json::json!({"user": "Alice"}),
//! )?;
//! assert_eq!(output, "Hello, Alice!");
//! ```

pub mod ast;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod expression;
pub mod functions;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod position;
pub mod resolver;
pub mod templates;
pub mod validation;
pub mod value;

mod executor;
mod registry;

// Re-export main types at crate root
pub use ast::{Attributes, Node};
pub use cancellation::Cancellation;
pub use config::{ConfigError, Delimiters, EngineConfig, Limits};
pub use context::{Context, ErrorStrategy};
pub use engine::Engine;
pub use error::{
    ExpressionErrorKind, FunctionError, LimitKind, ParseErrorKind, PromptyError, PromptyResult,
    RegistryError, RegistryKind, ResolveError,
};
pub use functions::{Function, FunctionRegistry};
pub use logging::{CollectingLogger, ErrorLogger, ErrorRecord, NoopLogger, TracingLogger};
pub use parser::{Template, parse, parse_with_delimiters};
pub use position::{Position, Span};
pub use registry::RESERVED_PREFIX;
pub use resolver::{
    CONTENT_ATTRIBUTE, FnResolver, Resolver, ResolverRegistry, TAG_INCLUDE, TAG_VAR, VarResolver,
};
pub use templates::TemplateRegistry;
pub use validation::{Issue, Severity, ValidationResult};
pub use value::Value;
