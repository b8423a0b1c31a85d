//! Scalar value model shared by elements, holders and templates.
//!
//! Variables carried by elements and holders are restricted to a small set of
//! scalars (string, integer, float, boolean) or a short list of those. The
//! JSON form is the natural one (`"abc"`, `12`, `1.5`, `true`, `[1, 2]`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Ordered map of variable name to value.
pub type VarMap = BTreeMap<String, Value>;

/// A variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Borrow the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view. Strings holding an integer literal are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Float(_) | Self::List(_) => None,
        }
    }

    /// Float view. Integers and numeric strings are accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(_) | Self::List(_) => None,
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    /// Truthiness using the same rule as holder filters: empty, `0`,
    /// `false` and `False` are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => is_truthy_str(s),
            Self::List(items) => !items.is_empty(),
        }
    }

    /// Short type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }

    /// Convert a JSON value. Objects and nested lists are rejected; `null`
    /// becomes an empty string.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Self::Str(String::new())),
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n
                    .as_f64()
                    .map(Self::Float)
                    .ok_or_else(|| Error::invalid_value(format!("number out of range: {n}"))),
            },
            serde_json::Value::String(s) => Ok(Self::Str(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(
                        Error::invalid_value("lists may only contain scalar values"),
                    ),
                    other => Self::from_json(other),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            serde_json::Value::Object(_) => {
                Err(Error::invalid_value("objects cannot be used as variable values"))
            }
        }
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

/// Truthiness of a string: empty, `0`, `false` and `False` are false.
pub fn is_truthy_str(s: &str) -> bool {
    !matches!(s, "" | "0" | "false" | "False")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Self::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::from("abc").to_string(), "abc");
        assert_eq!(Value::from(12).to_string(), "12");
        assert_eq!(Value::from(2.0).to_string(), "2");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(vec![1, 2, 3]).to_string(), "1 2 3");
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::from("0012").as_i64(), Some(12));
        assert_eq!(Value::from(3.0).as_i64(), Some(3));
        assert_eq!(Value::from(3.5).as_i64(), None);
        assert_eq!(Value::from(-2.0).as_i64(), Some(-2));
        assert_eq!(Value::from(-0.25).as_i64(), None);
        assert_eq!(Value::List(vec![Value::from(1)]).as_i64(), None);
        assert_eq!(Value::from(4).as_f64(), Some(4.0));
        assert_eq!(Value::from("abc").as_f64(), None);
    }

    #[test]
    fn test_truthiness() {
        for falsy in ["", "0", "false", "False"] {
            assert!(!Value::from(falsy).is_truthy(), "{falsy:?} should be false");
        }
        assert!(Value::from("no").is_truthy());
        assert!(Value::from(1).is_truthy());
        assert!(!Value::from(0).is_truthy());
    }

    #[test]
    fn test_json_shapes() {
        let json = serde_json::json!({"a": 1, "b": 1.5, "c": "x", "d": [1, "y"], "e": true});
        let map: VarMap = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(map["a"], Value::Int(1));
        assert_eq!(map["b"], Value::Float(1.5));
        assert_eq!(map["d"], Value::List(vec![Value::Int(1), Value::from("y")]));
        assert_eq!(serde_json::to_value(&map).unwrap(), json);
    }

    #[test]
    fn test_from_json_rejects_objects() {
        let err = Value::from_json(&serde_json::json!({"nested": 1})).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
        assert!(Value::from_json(&serde_json::json!([[1]])).is_err());
    }
}
