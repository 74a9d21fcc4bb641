/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template value type.
//!
//! [`Value`] is what execution data, expression results and function
//! arguments are made of. Maps are ordered by key, which makes every
//! iteration over a map (and therefore every rendering) deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A value that can be used in template execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// An absent value.
    #[default]
    Null,

    /// A boolean value.
    Bool(bool),

    /// An integer.
    Int(i64),

    /// A floating point number.
    Float(f64),

    /// A string value.
    String(String),

    /// A list of values.
    List(Vec<Value>),

    /// A map of string keys to values, sorted by key.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Check if this value is "truthy" for conditional evaluation.
    ///
    /// - Booleans are taken as-is
    /// - Strings are truthy when non-empty
    /// - Numbers are truthy when non-zero
    /// - Lists and maps are truthy when non-empty
    /// - Null is always falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Get a nested value by path.
    ///
    /// Map segments are looked up by key, list segments by zero-based index.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };

        match self {
            Value::Map(m) => m.get(*first).and_then(|v| v.get_path(rest)),
            Value::List(items) => first
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .and_then(|v| v.get_path(rest)),
            _ => None,
        }
    }

    /// Equality used by expressions and `case value=` matching.
    ///
    /// Integers and floats compare numerically; values of different types
    /// are never equal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            (a, b) => a == b,
        }
    }

    /// Render this value as a string for output.
    ///
    /// - String: returned as-is
    /// - Int: decimal
    /// - Float: shortest form, integral floats without a fraction (`2.0` → `2`)
    /// - Bool: `true` / `false`
    /// - List, Map: compact JSON
    /// - Null: ""
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => render_float(*f),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Value::Float(n as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::from(n),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());

        assert!(Value::from("hello").is_truthy());
        assert!(Value::from("false").is_truthy()); // "false" string is truthy!
        assert!(!Value::from("").is_truthy());

        assert!(Value::Int(-1).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());

        assert!(Value::List(vec![Value::Bool(false)]).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());

        let mut map = BTreeMap::new();
        map.insert("key".to_string(), Value::Null);
        assert!(Value::Map(map).is_truthy());
        assert!(!Value::Map(BTreeMap::new()).is_truthy());

        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_get_path() {
        let value = Value::from(json!({
            "employee": { "salary": 50000, "tags": ["a", "b"] }
        }));

        assert_eq!(
            value.get_path(&["employee", "salary"]),
            Some(&Value::Int(50000))
        );
        assert_eq!(
            value.get_path(&["employee", "tags", "1"]),
            Some(&Value::from("b"))
        );
        assert_eq!(value.get_path(&["employee", "tags", "9"]), None);
        assert_eq!(value.get_path(&["employee", "name"]), None);
        assert_eq!(value.get_path(&["nonexistent"]), None);
    }

    #[test]
    fn test_render() {
        assert_eq!(Value::Null.render(), "");
        assert_eq!(Value::Bool(false).render(), "false");
        assert_eq!(Value::Int(-3).render(), "-3");
        assert_eq!(Value::Float(2.0).render(), "2");
        assert_eq!(Value::Float(1.5).render(), "1.5");
        assert_eq!(Value::from("x").render(), "x");
        assert_eq!(Value::from(json!([1, "a", true])).render(), r#"[1,"a",true]"#);
        assert_eq!(Value::from(json!({"b": 1, "a": 2})).render(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_loose_eq() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).loose_eq(&Value::from("1")));
        assert!(Value::from("a").loose_eq(&Value::from("a")));
        assert!(!Value::Null.loose_eq(&Value::Bool(false)));
        assert!(Value::Null.loose_eq(&Value::Null));
    }

    #[test]
    fn test_json_conversion() {
        let json = json!({"n": 1, "f": 1.25, "s": "x", "l": [null, false]});
        let value = Value::from(json.clone());

        assert_eq!(value.get_path(&["n"]), Some(&Value::Int(1)));
        assert_eq!(value.get_path(&["f"]), Some(&Value::Float(1.25)));

        let back: serde_json::Value = value.into();
        assert_eq!(back, json);
    }

    #[test]
    fn test_deserialize_untagged() {
        let value: Value = serde_json::from_str(r#"{"a": [1, 2.5, "x", null]}"#).unwrap();
        assert_eq!(
            value.get_path(&["a"]),
            Some(&Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::from("x"),
                Value::Null,
            ]))
        );
    }
}
