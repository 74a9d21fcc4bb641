/*
 * engine.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The [`Engine`] handle.
//!
//! An engine owns the configuration and the three registries (resolvers,
//! functions, named templates). It is a cheap, cloneable handle: clones share
//! the same registries, so a resolver registered through one clone is visible
//! to every template parsed by any of them.
//!
//! ```ignore
//! let engine = Engine::new();
//! engine.register_template("greeting", r#"Hello, {~prompty.var name="user" /~}!"#)?;
//! let out = engine.execute(
//!     &Cancellation::new(),
//!     r#"{~prompty.include template="greeting" /~}"#,
//!     serde_json::json!({"user": "Alice"}),
//! )?;
//! assert_eq!(out, "Hello, Alice!");
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::cancellation::Cancellation;
use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::{PromptyError, PromptyResult, RegistryError};
use crate::executor;
use crate::expression::{self, Evaluator};
use crate::functions::{Function, FunctionRegistry};
use crate::parser::Template;
use crate::position::Position;
use crate::resolver::{Resolver, ResolverRegistry};
use crate::templates::TemplateRegistry;
use crate::validation::{self, ValidationResult};
use crate::value::Value;

struct EngineInner {
    config: EngineConfig,
    resolvers: ResolverRegistry,
    functions: FunctionRegistry,
    templates: TemplateRegistry,
}

/// Template engine: configuration plus resolver, function and template
/// registries.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine with the default configuration and built-ins.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                resolvers: ResolverRegistry::with_builtins(),
                functions: FunctionRegistry::with_builtins(),
                templates: TemplateRegistry::new(),
            }),
        }
    }

    /// Process-wide engine used by templates parsed without one.
    pub(crate) fn shared_default() -> Engine {
        static SHARED: OnceLock<Engine> = OnceLock::new();
        SHARED.get_or_init(Engine::new).clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.inner.resolvers
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.inner.functions
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.inner.templates
    }

    // ------------------------------------------------------------------
    // Parsing and execution
    // ------------------------------------------------------------------

    /// Parse `source` with this engine's delimiters.
    ///
    /// The returned template executes against this engine's registries.
    pub fn parse(&self, source: &str) -> PromptyResult<Template> {
        Template::parse_with_delimiters(source, self.config().delimiters())
            .map(|template| template.bind(self.clone()))
    }

    /// Parse and execute `source` in one step.
    pub fn execute(
        &self,
        cancel: &Cancellation,
        source: &str,
        data: impl Into<Value>,
    ) -> PromptyResult<String> {
        self.parse(source)?.execute(cancel, data)
    }

    /// Parse `source` and execute it against a caller-built context.
    pub fn execute_with_context(
        &self,
        cancel: &Cancellation,
        source: &str,
        ctx: &Context<'_>,
    ) -> PromptyResult<String> {
        self.parse(source)?.execute_with_context(cancel, ctx)
    }

    pub(crate) fn execute_template(
        &self,
        template: &Template,
        cancel: &Cancellation,
        ctx: &Context<'_>,
    ) -> PromptyResult<String> {
        executor::execute(self, template, cancel, ctx)
    }

    /// Check `source` without executing it.
    pub fn validate(&self, source: &str) -> ValidationResult {
        validation::validate(self, source)
    }

    /// Evaluate a standalone expression, e.g. `len(items) > 2`, against `data`.
    pub fn evaluate(&self, expression: &str, data: impl Into<Value>) -> PromptyResult<Value> {
        let expr = expression::parse(expression).map_err(|err| {
            PromptyError::expression(
                err.kind,
                err.message,
                Position::at_offset(expression, err.offset),
            )
        })?;
        let ctx = Context::from_value(data)?;
        Evaluator::new(
            self.functions(),
            self.config().limits().function_timeout,
            Position::start(),
        )
        .eval(&expr, &ctx)
    }

    // ------------------------------------------------------------------
    // Resolvers
    // ------------------------------------------------------------------

    /// Register a resolver under its tag name. The first registration wins.
    pub fn register_resolver<R: Resolver + 'static>(&self, resolver: R) -> Result<(), RegistryError> {
        self.resolvers().register(Arc::new(resolver))
    }

    /// Like [`register_resolver`](Self::register_resolver) but panics on
    /// collision or an invalid name.
    pub fn must_register_resolver<R: Resolver + 'static>(&self, resolver: R) {
        if let Err(err) = self.register_resolver(resolver) {
            panic!("{}", err);
        }
    }

    pub fn unregister_resolver(&self, name: &str) -> Result<(), RegistryError> {
        self.resolvers().unregister(name)
    }

    pub fn has_resolver(&self, name: &str) -> bool {
        self.resolvers().has(name)
    }

    pub fn resolver_names(&self) -> Vec<String> {
        self.resolvers().names()
    }

    pub fn resolver_count(&self) -> usize {
        self.resolvers().count()
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    pub fn register_function(&self, function: Function) -> Result<(), RegistryError> {
        self.functions().register(function)
    }

    pub fn must_register_function(&self, function: Function) {
        if let Err(err) = self.register_function(function) {
            panic!("{}", err);
        }
    }

    pub fn unregister_function(&self, name: &str) -> Result<(), RegistryError> {
        self.functions().unregister(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions().has(name)
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions().names()
    }

    pub fn function_count(&self) -> usize {
        self.functions().count()
    }

    // ------------------------------------------------------------------
    // Named templates
    // ------------------------------------------------------------------

    /// Parse `source` and register it for `prompty.include` under `name`.
    pub fn register_template(&self, name: &str, source: &str) -> Result<(), RegistryError> {
        let template = Template::parse_with_delimiters(source, self.config().delimiters())
            .map_err(|err| RegistryError::InvalidTemplate {
                name: name.to_string(),
                source: Box::new(err),
            })?;
        self.templates().register(name, template)
    }

    pub fn must_register_template(&self, name: &str, source: &str) {
        if let Err(err) = self.register_template(name, source) {
            panic!("{}", err);
        }
    }

    pub fn unregister_template(&self, name: &str) -> Result<(), RegistryError> {
        self.templates().unregister(name)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates().has(name)
    }

    pub fn template_names(&self) -> Vec<String> {
        self.templates().names()
    }

    pub fn template_count(&self) -> usize {
        self.templates().count()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("resolvers", &self.inner.resolvers.names())
            .field("functions", &self.inner.functions.count())
            .field("templates", &self.inner.templates.names())
            .finish()
    }
}
