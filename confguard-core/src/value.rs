//! Scalar leaf values
//!
//! A closed tagged enum replaces dynamic JSON values: navigation and
//! comparison code match on the tag. Canonical string forms follow the
//! YANG canonical representation and are what key predicates and error
//! messages carry.

use crate::path::QName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed leaf or leaf-list value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// String value
    String(String),
    /// Signed integer (int8..int64)
    Int(i64),
    /// Unsigned integer (uint8..uint64)
    Uint(u64),
    /// decimal64 value
    Decimal(f64),
    /// Boolean value
    Bool(bool),
    /// Enumeration label
    Enum(String),
    /// Identity reference
    Identity(QName),
    /// Set bit labels of a `bits` leaf, in declaration order
    Bits(Vec<String>),
    /// The YANG `empty` type
    Empty,
}

impl Scalar {
    /// Canonical string form, as used in key predicates and messages
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Numeric interpretation, when one exists
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Uint(u) => Some(*u as f64),
            Scalar::Decimal(d) => Some(*d),
            Scalar::String(s) | Scalar::Enum(s) => s.trim().parse::<f64>().ok(),
            Scalar::Bool(_) | Scalar::Identity(_) | Scalar::Bits(_) | Scalar::Empty => None,
        }
    }

    /// XPath boolean coercion: empty string and zero are false
    #[must_use]
    pub fn as_boolean(&self) -> bool {
        match self {
            Scalar::String(s) | Scalar::Enum(s) => !s.is_empty(),
            Scalar::Int(i) => *i != 0,
            Scalar::Uint(u) => *u != 0,
            Scalar::Decimal(d) => *d != 0.0,
            Scalar::Bool(b) => *b,
            Scalar::Identity(_) | Scalar::Empty => true,
            Scalar::Bits(bits) => !bits.is_empty(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) | Scalar::Enum(s) => write!(f, "{s}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Uint(u) => write!(f, "{u}"),
            Scalar::Decimal(d) => write!(f, "{d}"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Identity(q) => write!(f, "{q}"),
            Scalar::Bits(bits) => write!(f, "{}", bits.join(" ")),
            Scalar::Empty => Ok(()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}
