/*
 * functions.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Functions callable from `eval` expressions.
//!
//! Expressions can only call what is registered here, so this registry is
//! the boundary of the expression sandbox. A [`Function`] declares its
//! arity; the evaluator checks argument counts before the body runs.

use std::fmt;
use std::sync::Arc;

use crate::error::{FunctionError, RegistryError, RegistryKind};
use crate::registry::Registry;
use crate::value::Value;

/// Signature of a function body.
pub type FunctionBody = dyn Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync;

/// A named, arity-checked pure function.
#[derive(Clone)]
pub struct Function {
    name: String,
    min_args: usize,
    /// `None` for variadic functions.
    max_args: Option<usize>,
    body: Arc<FunctionBody>,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        min_args: usize,
        max_args: Option<usize>,
        body: impl Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            min_args,
            max_args,
            body: Arc::new(body),
        }
    }

    /// A function taking exactly `args` arguments.
    pub fn fixed(
        name: impl Into<String>,
        args: usize,
        body: impl Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, args, Some(args), body)
    }

    /// A function taking `min_args` or more arguments.
    pub fn variadic(
        name: impl Into<String>,
        min_args: usize,
        body: impl Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, min_args, None, body)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_args(&self) -> usize {
        self.min_args
    }

    pub fn max_args(&self) -> Option<usize> {
        self.max_args
    }

    /// Whether a call with `count` arguments is allowed.
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }

    /// Human-readable arity, e.g. `2`, `1 to 2`, `at least 1`.
    pub fn arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }

    /// Invoke the body, rejecting argument counts outside the arity.
    pub fn call(&self, args: &[Value]) -> Result<Value, FunctionError> {
        if !self.accepts(args.len()) {
            return Err(FunctionError::new(format!(
                "function `{}` expects {} argument(s), got {}",
                self.name,
                self.arity(),
                args.len()
            )));
        }
        (self.body)(args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish_non_exhaustive()
    }
}

/// Registry of expression functions.
#[derive(Debug)]
pub struct FunctionRegistry {
    inner: Registry<Function>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Registry::new(RegistryKind::Function),
        }
    }

    /// Create a registry holding the built-in functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for function in builtins() {
            let name = function.name.clone();
            registry.inner.insert_builtin(&name, Arc::new(function));
        }
        registry
    }

    /// Register a function. The first registration of a name wins.
    pub fn register(&self, function: Function) -> Result<(), RegistryError> {
        let name = function.name.clone();
        self.inner.register(&name, Arc::new(function))
    }

    /// Remove a user-registered function.
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        self.inner.unregister(name).map(|_| ())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Function>> {
        self.inner.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    /// Sorted snapshot of registered function names.
    pub fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Built-in functions
// ============================================================================

fn builtins() -> Vec<Function> {
    vec![
        Function::fixed("len", 1, |args| match &args[0] {
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::List(items) => Ok(Value::from(items.len())),
            Value::Map(map) => Ok(Value::from(map.len())),
            Value::Null => Ok(Value::Int(0)),
            other => Err(FunctionError::new(format!(
                "len() expects a string, list or map, got {}",
                other.type_name()
            ))),
        }),
        Function::fixed("upper", 1, |args| {
            Ok(Value::String(text(&args[0], "upper")?.to_uppercase()))
        }),
        Function::fixed("lower", 1, |args| {
            Ok(Value::String(text(&args[0], "lower")?.to_lowercase()))
        }),
        Function::fixed("trim", 1, |args| {
            Ok(Value::String(text(&args[0], "trim")?.trim().to_string()))
        }),
        Function::fixed("contains", 2, |args| {
            let found = match &args[0] {
                Value::List(items) => items.iter().any(|item| item.loose_eq(&args[1])),
                Value::Map(map) => map.contains_key(&args[1].render()),
                Value::Null => false,
                haystack => text(haystack, "contains")?.contains(&args[1].render()),
            };
            Ok(Value::Bool(found))
        }),
        Function::fixed("hasPrefix", 2, |args| {
            let s = text(&args[0], "hasPrefix")?;
            Ok(Value::Bool(s.starts_with(&text(&args[1], "hasPrefix")?)))
        }),
        Function::fixed("hasSuffix", 2, |args| {
            let s = text(&args[0], "hasSuffix")?;
            Ok(Value::Bool(s.ends_with(&text(&args[1], "hasSuffix")?)))
        }),
        Function::fixed("default", 2, |args| {
            Ok(if args[0].is_truthy() {
                args[0].clone()
            } else {
                args[1].clone()
            })
        }),
        Function::fixed("toString", 1, |args| Ok(Value::String(args[0].render()))),
        Function::fixed("toInt", 1, |args| to_int(&args[0]).map(Value::Int)),
        Function::fixed("isEmpty", 1, |args| {
            Ok(Value::Bool(match &args[0] {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::List(items) => items.is_empty(),
                Value::Map(map) => map.is_empty(),
                Value::Bool(_) | Value::Int(_) | Value::Float(_) => false,
            }))
        }),
        Function::fixed("join", 2, |args| {
            let Value::List(items) = &args[0] else {
                return Err(FunctionError::new(format!(
                    "join() expects a list, got {}",
                    args[0].type_name()
                )));
            };
            let separator = args[1].render();
            let parts: Vec<String> = items.iter().map(Value::render).collect();
            Ok(Value::String(parts.join(&separator)))
        }),
        Function::variadic("min", 1, |args| extremum(args, "min", std::cmp::Ordering::Less)),
        Function::variadic("max", 1, |args| {
            extremum(args, "max", std::cmp::Ordering::Greater)
        }),
    ]
}

/// Scalars as text; collections are rejected.
fn text(value: &Value, function: &str) -> Result<String, FunctionError> {
    match value {
        Value::List(_) | Value::Map(_) => Err(FunctionError::new(format!(
            "{}() expects a string, got {}",
            function,
            value.type_name()
        ))),
        other => Ok(other.render()),
    }
}

fn to_int(value: &Value) -> Result<i64, FunctionError> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Null => Ok(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
                .ok_or_else(|| FunctionError::new(format!("toInt() cannot convert \"{}\"", s)))
        }
        other => Err(FunctionError::new(format!(
            "toInt() cannot convert a {}",
            other.type_name()
        ))),
    }
}

/// Smallest (`Less`) or largest (`Greater`) of the arguments.
///
/// A single list argument is treated as the argument list.
fn extremum(
    args: &[Value],
    function: &str,
    wanted: std::cmp::Ordering,
) -> Result<Value, FunctionError> {
    let values = match args {
        [Value::List(items)] => items.as_slice(),
        _ => args,
    };
    let Some((first, rest)) = values.split_first() else {
        return Err(FunctionError::new(format!("{}() of an empty list", function)));
    };

    let mut best = first;
    for candidate in rest {
        let ordering = match (candidate, best) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (a, b) if a.is_number() && b.is_number() => {
                let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
            }
            (a, b) => {
                return Err(FunctionError::new(format!(
                    "{}() cannot compare {} with {}",
                    function,
                    a.type_name(),
                    b.type_name()
                )));
            }
        };
        if ordering == wanted {
            best = candidate;
        }
    }
    Ok(best.clone())
}
