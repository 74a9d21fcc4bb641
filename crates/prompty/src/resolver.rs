/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tag resolvers.
//!
//! A [`Resolver`] produces the output text for every occurrence of one tag
//! name. Resolvers are looked up by name when the executor reaches a tag, so
//! they can be registered after the templates using them were parsed.
//!
//! The built-in `prompty.var` tag is an ordinary resolver. `prompty.include`
//! is reserved here but implemented by the executor, since it needs the
//! include chain and depth counter of the running execution.

use std::fmt;
use std::sync::Arc;

use crate::ast::Attributes;
use crate::context::Context;
use crate::error::{RegistryError, RegistryKind, ResolveError};
use crate::registry::Registry;

pub const TAG_VAR: &str = "prompty.var";
pub const TAG_INCLUDE: &str = "prompty.include";

/// Attribute holding the rendered children of a block tag.
pub const CONTENT_ATTRIBUTE: &str = "_content";

/// Handler for one tag name.
///
/// Implementors must be `Send + Sync`; a single resolver instance serves
/// every execution that uses the engine, possibly from several threads.
pub trait Resolver: Send + Sync {
    /// The tag name this resolver handles (e.g. `echo`).
    fn tag_name(&self) -> &str;

    /// Check the tag's attributes before resolution.
    fn validate(&self, _attributes: &Attributes) -> Result<(), ResolveError> {
        Ok(())
    }

    /// Produce the tag's output.
    ///
    /// For block tags the rendered children are passed in the
    /// [`CONTENT_ATTRIBUTE`] attribute.
    fn resolve(&self, ctx: &Context<'_>, attributes: &Attributes) -> Result<String, ResolveError>;
}

/// Signature of closures wrapped by [`FnResolver`].
type ResolveFn = dyn Fn(&Context<'_>, &Attributes) -> Result<String, ResolveError> + Send + Sync;

/// A resolver built from a closure, for simple tags.
///
/// ```ignore
/// engine.register_resolver(FnResolver::new("shout", |_, attrs| {
///     Ok(attrs.get_or("_content", "").to_uppercase())
/// }))?;
/// ```
pub struct FnResolver {
    name: String,
    required: Vec<String>,
    resolve: Box<ResolveFn>,
}

impl FnResolver {
    pub fn new(
        name: impl Into<String>,
        resolve: impl Fn(&Context<'_>, &Attributes) -> Result<String, ResolveError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            required: Vec::new(),
            resolve: Box::new(resolve),
        }
    }

    /// Require `attribute` to be present; checked by `validate`.
    pub fn with_required(mut self, attribute: impl Into<String>) -> Self {
        self.required.push(attribute.into());
        self
    }
}

impl fmt::Debug for FnResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResolver")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

impl Resolver for FnResolver {
    fn tag_name(&self) -> &str {
        &self.name
    }

    fn validate(&self, attributes: &Attributes) -> Result<(), ResolveError> {
        match self.required.iter().find(|key| !attributes.has(key)) {
            Some(missing) => Err(ResolveError::MissingAttribute(missing.clone())),
            None => Ok(()),
        }
    }

    fn resolve(&self, ctx: &Context<'_>, attributes: &Attributes) -> Result<String, ResolveError> {
        (self.resolve)(ctx, attributes)
    }
}

/// `{~prompty.var name="user.name" /~}`: render a context value.
#[derive(Debug, Default)]
pub struct VarResolver;

impl Resolver for VarResolver {
    fn tag_name(&self) -> &str {
        TAG_VAR
    }

    fn validate(&self, attributes: &Attributes) -> Result<(), ResolveError> {
        match attributes.get("name") {
            None => Err(ResolveError::MissingAttribute("name".to_string())),
            Some(name) if name.trim().is_empty() => Err(ResolveError::InvalidAttribute {
                name: "name".to_string(),
                message: "variable name must not be empty".to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn resolve(&self, ctx: &Context<'_>, attributes: &Attributes) -> Result<String, ResolveError> {
        let name = attributes
            .get("name")
            .ok_or_else(|| ResolveError::MissingAttribute("name".to_string()))?;
        ctx.get(name)
            .map(|value| value.render())
            .ok_or_else(|| ResolveError::VariableNotFound(name.to_string()))
    }
}

/// Registry of tag resolvers.
#[derive(Debug)]
pub struct ResolverRegistry {
    inner: Registry<dyn Resolver>,
}

impl ResolverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Registry::new(RegistryKind::Resolver),
        }
    }

    /// Create a registry with the built-in tags bound.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.inner.insert_builtin(TAG_VAR, Arc::new(VarResolver));
        registry.inner.reserve_builtin(TAG_INCLUDE);
        registry
    }

    /// Register a resolver under its tag name. The first registration wins.
    pub fn register(&self, resolver: Arc<dyn Resolver>) -> Result<(), RegistryError> {
        let name = resolver.tag_name().to_string();
        self.inner.register(&name, resolver)
    }

    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        self.inner.unregister(name).map(|_| ())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Resolver>> {
        self.inner.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    /// Sorted snapshot of registered tag names.
    pub fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(output: &'static str) -> Arc<dyn Resolver> {
        Arc::new(FnResolver::new("echo", move |_, _| Ok(output.to_string())))
    }

    #[test]
    fn test_var_resolver() {
        let ctx = Context::from_value(json!({"user": {"name": "Alice"}, "n": 2.0})).unwrap();
        let var = VarResolver;

        let attrs = Attributes::new().with("name", "user.name");
        assert_eq!(var.resolve(&ctx, &attrs).unwrap(), "Alice");

        let attrs = Attributes::new().with("name", "n");
        assert_eq!(var.resolve(&ctx, &attrs).unwrap(), "2");

        let attrs = Attributes::new().with("name", "missing");
        assert_eq!(
            var.resolve(&ctx, &attrs),
            Err(ResolveError::VariableNotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_var_validate() {
        let var = VarResolver;
        assert!(var.validate(&Attributes::new().with("name", "x")).is_ok());
        assert_eq!(
            var.validate(&Attributes::new()),
            Err(ResolveError::MissingAttribute("name".to_string()))
        );
        assert!(var.validate(&Attributes::new().with("name", " ")).is_err());
    }

    #[test]
    fn test_fn_resolver_required_attributes() {
        let resolver = FnResolver::new("greet", |_, attrs| {
            Ok(format!("hi {}", attrs.get_or("who", "?")))
        })
        .with_required("who");

        assert_eq!(
            resolver.validate(&Attributes::new()),
            Err(ResolveError::MissingAttribute("who".to_string()))
        );
        let attrs = Attributes::new().with("who", "Bob");
        assert!(resolver.validate(&attrs).is_ok());
        assert_eq!(resolver.resolve(&Context::new(), &attrs).unwrap(), "hi Bob");
    }

    #[test]
    fn test_registry_collision_keeps_first() {
        let registry = ResolverRegistry::with_builtins();
        registry.register(echo("first")).unwrap();

        let err = registry.register(echo("second")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));

        let bound = registry.get("echo").unwrap();
        assert_eq!(bound.resolve(&Context::new(), &Attributes::new()).unwrap(), "first");
    }

    #[test]
    fn test_registry_builtins() {
        let registry = ResolverRegistry::with_builtins();
        assert!(registry.has(TAG_VAR));
        assert!(registry.has(TAG_INCLUDE));
        assert_eq!(registry.names(), vec![TAG_INCLUDE, TAG_VAR]);
        assert_eq!(registry.count(), 2);

        let custom = Arc::new(FnResolver::new("prompty.custom", |_, _| Ok(String::new())));
        assert!(matches!(
            registry.register(custom),
            Err(RegistryError::ReservedName { .. })
        ));
        assert!(matches!(
            registry.unregister(TAG_VAR),
            Err(RegistryError::BuiltIn { .. })
        ));
    }
}
