// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Key-value attributes shared by logs, spans, and metrics.

use std::fmt;
use std::sync::Arc;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    StringArray(Vec<Arc<str>>),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
            Self::StringArray(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(v)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for AttributeValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(Arc::from(v))
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(Arc::from(v))
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        Self::StringArray(values.into_iter().map(Arc::from).collect())
    }
}

/// A single key-value pair.
///
/// Used as a log field, a span attribute, and a metric series label.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: Arc<str>,
    pub value: AttributeValue,
}

impl KeyValue {
    /// Create a new key-value pair.
    pub fn new(key: impl Into<Arc<str>>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Shorthand for a string attribute.
pub fn string(key: impl Into<Arc<str>>, value: impl Into<String>) -> KeyValue {
    KeyValue::new(key, value.into())
}

/// Shorthand for an integer attribute.
pub fn int(key: impl Into<Arc<str>>, value: i64) -> KeyValue {
    KeyValue::new(key, value)
}

/// Shorthand for a float attribute.
pub fn float(key: impl Into<Arc<str>>, value: f64) -> KeyValue {
    KeyValue::new(key, value)
}

/// Shorthand for a boolean attribute.
pub fn boolean(key: impl Into<Arc<str>>, value: bool) -> KeyValue {
    KeyValue::new(key, value)
}

/// Render attributes as `key=value` pairs separated by spaces.
pub fn render(attrs: &[KeyValue]) -> String {
    let mut out = String::new();
    for (i, kv) in attrs.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&kv.to_string());
    }
    out
}

/// Canonical series key for a set of attributes: sorted by key, comma-joined.
///
/// Two attribute slices holding the same pairs in different order map to the
/// same key.
pub fn series_key(attrs: &[KeyValue]) -> String {
    let mut pairs: Vec<String> = attrs.iter().map(ToString::to_string).collect();
    pairs.sort();
    pairs.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_display() {
        assert_eq!(string("method", "Svc.Get").to_string(), "method=Svc.Get");
        assert_eq!(int("count", 3).to_string(), "count=3");
        assert_eq!(boolean("ok", true).to_string(), "ok=true");
    }

    #[test]
    fn test_render_joins_with_spaces() {
        let rendered = render(&[string("a", "1"), int("b", 2)]);
        assert_eq!(rendered, "a=1 b=2");
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn test_series_key_is_order_independent() {
        let a = series_key(&[string("outcome", "ok"), string("method", "m")]);
        let b = series_key(&[string("method", "m"), string("outcome", "ok")]);
        assert_eq!(a, b);
        assert_eq!(a, "method=m,outcome=ok");
    }

    #[test]
    fn test_string_array_display() {
        let kv = KeyValue::new("tags", vec!["a".to_string(), "b".to_string()]);
        assert_eq!(kv.to_string(), "tags=[a,b]");
    }
}
