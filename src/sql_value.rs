//! Defines an enum of all the possible values that can live in a row column
//! or on the virtual machine's operand stack.
//!
//! Values are dynamically typed with an explicit tag; the tag travels with
//! the value through the row codec, so a decoded row restores the exact
//! variants that were stored.

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum SqlValue {
    Int(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl SqlValue {
    /// Truthiness for `JUMP_IF_FALSE` and the logical operators: zero,
    /// the empty string and `false` are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            SqlValue::Int(x) => *x != 0,
            SqlValue::Real(x) => *x != 0.0,
            SqlValue::Text(x) => !x.is_empty(),
            SqlValue::Bool(x) => *x,
        }
    }

    /// Numeric view of the value, when it has one. Ints widen to f64 so
    /// that `Int` and `Real` compare against each other.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SqlValue::Int(x) => Some(*x as f64),
            SqlValue::Real(x) => Some(*x),
            _ => None,
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Int(x) => write!(f, "{}", x),
            SqlValue::Real(x) => write!(f, "{}", x),
            SqlValue::Text(x) => write!(f, "{}", x),
            SqlValue::Bool(x) => write!(f, "{}", x),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(x: i64) -> Self {
        SqlValue::Int(x)
    }
}

impl From<f64> for SqlValue {
    fn from(x: f64) -> Self {
        SqlValue::Real(x)
    }
}

impl From<&str> for SqlValue {
    fn from(x: &str) -> Self {
        SqlValue::Text(x.to_string())
    }
}

impl From<bool> for SqlValue {
    fn from(x: bool) -> Self {
        SqlValue::Bool(x)
    }
}

#[test]
fn test_truthiness() {
    assert!(SqlValue::Int(1).is_truthy());
    assert!(!SqlValue::Int(0).is_truthy());
    assert!(SqlValue::Real(0.5).is_truthy());
    assert!(!SqlValue::Real(0.0).is_truthy());
    assert!(SqlValue::Text("x".into()).is_truthy());
    assert!(!SqlValue::Text("".into()).is_truthy());
    assert!(SqlValue::Bool(true).is_truthy());
    assert!(!SqlValue::Bool(false).is_truthy());
}

#[test]
fn test_numeric_view_widens_ints() {
    assert_eq!(SqlValue::Int(3).as_number(), Some(3.0));
    assert_eq!(SqlValue::Real(2.5).as_number(), Some(2.5));
    assert_eq!(SqlValue::Text("3".into()).as_number(), None);
}

#[test]
fn test_serialized_form_carries_tag() {
    assert_eq!(
        serde_json::to_string(&SqlValue::Int(35)).unwrap(),
        r#"{"Int":35}"#
    );
    assert_eq!(
        serde_json::to_string(&SqlValue::Text("Alice".into())).unwrap(),
        r#"{"Text":"Alice"}"#
    );
    let back: SqlValue = serde_json::from_str(r#"{"Real":2.5}"#).unwrap();
    assert_eq!(back, SqlValue::Real(2.5));
}
