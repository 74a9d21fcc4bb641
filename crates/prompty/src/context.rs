/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Execution context and error strategies.
//!
//! A [`Context`] holds the data a template executes against, a non-owning
//! reference to its parent scope, and the active [`ErrorStrategy`]. The
//! executor creates an inheriting child per loop iteration and a child per
//! include; those children live only as long as the call frame that made
//! them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cancellation::Cancellation;
use crate::error::{PromptyError, PromptyResult};
use crate::value::Value;

/// What to do when a tag fails to resolve or an expression fails to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    /// Abort the whole execution and return the error.
    #[default]
    Throw,
    /// Substitute the tag's `default` attribute, or nothing.
    Default,
    /// Emit nothing for the tag.
    Remove,
    /// Emit the tag's original source text.
    KeepRaw,
    /// Report the error to the logging sink and emit nothing.
    Log,
}

impl ErrorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStrategy::Throw => "throw",
            ErrorStrategy::Default => "default",
            ErrorStrategy::Remove => "remove",
            ErrorStrategy::KeepRaw => "keepraw",
            ErrorStrategy::Log => "log",
        }
    }
}

impl fmt::Display for ErrorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "throw" => Ok(ErrorStrategy::Throw),
            "default" => Ok(ErrorStrategy::Default),
            "remove" => Ok(ErrorStrategy::Remove),
            "keepraw" => Ok(ErrorStrategy::KeepRaw),
            "log" => Ok(ErrorStrategy::Log),
            other => Err(format!(
                "unknown error strategy `{}` (expected throw, default, remove, keepraw or log)",
                other
            )),
        }
    }
}

/// Hierarchical data store for one execution scope.
#[derive(Debug, Clone, Default)]
pub struct Context<'p> {
    /// Variable bindings at this level.
    data: BTreeMap<String, Value>,

    /// Parent scope, consulted when a key is absent locally.
    parent: Option<&'p Context<'p>>,

    error_strategy: ErrorStrategy,

    cancellation: Option<Cancellation>,
}

impl Context<'static> {
    /// Create a new empty root context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root context from a map of bindings.
    pub fn from_data(data: BTreeMap<String, Value>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Create a root context from a value, which must be a map or null.
    pub fn from_value(value: impl Into<Value>) -> PromptyResult<Self> {
        match value.into() {
            Value::Map(data) => Ok(Self::from_data(data)),
            Value::Null => Ok(Self::new()),
            other => Err(PromptyError::InvalidData {
                message: format!("expected a map of variables, got a {}", other.type_name()),
            }),
        }
    }
}

impl<'p> Context<'p> {
    /// Set the error strategy for this scope and the scopes created from it.
    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = strategy;
        self
    }

    pub fn set_error_strategy(&mut self, strategy: ErrorStrategy) {
        self.error_strategy = strategy;
    }

    pub fn error_strategy(&self) -> ErrorStrategy {
        self.error_strategy
    }

    pub(crate) fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Whether the execution this context belongs to has been cancelled.
    ///
    /// Long-running resolvers can poll this to abort early.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(Cancellation::is_cancelled)
    }

    /// Create a child scope that inherits this scope's bindings.
    pub fn child(&self) -> Context<'_> {
        Context {
            data: BTreeMap::new(),
            parent: Some(self),
            error_strategy: self.error_strategy,
            cancellation: self.cancellation.clone(),
        }
    }

    /// Create a scope that sees only `data`, keeping the error strategy.
    pub fn isolated<'c>(&self, data: BTreeMap<String, Value>) -> Context<'c> {
        Context {
            data,
            parent: None,
            error_strategy: self.error_strategy,
            cancellation: self.cancellation.clone(),
        }
    }

    /// Bind a single key in this scope.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Look up a top-level key, checking parent scopes.
    fn lookup(&self, key: &str) -> Option<&Value> {
        self.data
            .get(key)
            .or_else(|| self.parent.and_then(|p| p.lookup(key)))
    }

    /// Get a value by dotted path (e.g. `employee.salary`, `items.0`).
    ///
    /// The first segment is resolved through the scope chain; the rest
    /// descend into the found value.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        let (first, rest) = segments.split_first()?;
        self.lookup(first).and_then(|v| v.get_path(rest))
    }

    /// Whether `path` resolves to a value.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Get a value by path, or `default` if absent.
    pub fn get_or(&self, path: &str, default: impl Into<Value>) -> Value {
        self.get(path).cloned().unwrap_or_else(|| default.into())
    }

    /// Get a value by path, rendered to a string.
    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path).map(Value::render)
    }

    /// Merged copy of every visible binding; inner scopes shadow outer ones.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let mut merged = self.parent.map(|p| p.snapshot()).unwrap_or_default();
        for (key, value) in &self.data {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("throw".parse(), Ok(ErrorStrategy::Throw));
        assert_eq!("KeepRaw".parse(), Ok(ErrorStrategy::KeepRaw));
        assert_eq!("log".parse(), Ok(ErrorStrategy::Log));
        assert!("ignore".parse::<ErrorStrategy>().is_err());
    }

    #[test]
    fn test_strategy_serde_names() {
        let s: ErrorStrategy = serde_json::from_str("\"keepraw\"").unwrap();
        assert_eq!(s, ErrorStrategy::KeepRaw);
        assert_eq!(ErrorStrategy::KeepRaw.to_string(), "keepraw");
    }

    #[test]
    fn test_from_value_requires_map() {
        assert!(Context::from_value(json!({"a": 1})).is_ok());
        assert!(Context::from_value(Value::Null).is_ok());
        assert!(matches!(
            Context::from_value(json!([1, 2])),
            Err(PromptyError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_get_by_path() {
        let ctx = Context::from_value(json!({
            "user": { "name": "Alice", "roles": ["admin", "dev"] }
        }))
        .unwrap();

        assert_eq!(ctx.get("user.name"), Some(&Value::from("Alice")));
        assert_eq!(ctx.get("user.roles.1"), Some(&Value::from("dev")));
        assert_eq!(ctx.get("user.email"), None);
        assert!(ctx.contains("user"));
        assert!(!ctx.contains("missing"));
        assert_eq!(ctx.get_or("missing", "N/A"), Value::from("N/A"));
        assert_eq!(ctx.get_string("user.name").as_deref(), Some("Alice"));
    }

    #[test]
    fn test_context_scoping() {
        let mut parent = Context::new();
        parent.set("x", "parent_x");
        parent.set("y", "parent_y");

        let mut child = parent.child();
        child.set("x", "child_x");

        // Child shadows parent for 'x'
        assert_eq!(child.get("x"), Some(&Value::from("child_x")));
        // Child inherits 'y' from parent
        assert_eq!(child.get("y"), Some(&Value::from("parent_y")));
        // Parent unchanged
        assert_eq!(parent.get("x"), Some(&Value::from("parent_x")));
    }

    #[test]
    fn test_isolated_scope() {
        let mut parent = Context::new().with_error_strategy(ErrorStrategy::Log);
        parent.set("secret", "s3cr3t");

        let mut data = BTreeMap::new();
        data.insert("visible".to_string(), Value::Bool(true));
        let isolated = parent.isolated(data);

        assert_eq!(isolated.get("secret"), None);
        assert_eq!(isolated.get("visible"), Some(&Value::Bool(true)));
        assert_eq!(isolated.error_strategy(), ErrorStrategy::Log);
    }

    #[test]
    fn test_snapshot_merges_scopes() {
        let mut parent = Context::new();
        parent.set("a", 1);
        parent.set("b", 2);

        let mut child = parent.child();
        child.set("b", 20);
        child.set("c", 30);

        let snapshot = child.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot["a"], Value::Int(1));
        assert_eq!(snapshot["b"], Value::Int(20));
        assert_eq!(snapshot["c"], Value::Int(30));
    }

    #[test]
    fn test_child_inherits_strategy_and_cancellation() {
        let cancel = Cancellation::new();
        let root = Context::new()
            .with_error_strategy(ErrorStrategy::Remove)
            .with_cancellation(cancel.clone());
        let child = root.child();

        assert_eq!(child.error_strategy(), ErrorStrategy::Remove);
        assert!(!child.is_cancelled());
        cancel.cancel();
        assert!(child.is_cancelled());
    }
}
