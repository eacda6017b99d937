//! Evaluation values for the constraint expression language
//!
//! The four XPath-1.0 value kinds. Node-sets hold references into the
//! instance tree, or detached state leaves fetched from a provider, so the
//! coercions that need a node's string value live on the evaluator.

use confguard_core::{InstancePath, NodeId, Scalar};

/// One member of a node-set
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRef {
    /// A node of the instance tree
    Tree(NodeId),
    /// An operational-state leaf fetched from a provider
    State {
        /// Absolute path of the state leaf
        path: InstancePath,
        /// The fetched value
        value: Scalar,
    },
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean
    Boolean(bool),
    /// IEEE-754 double, XPath's only numeric kind
    Number(f64),
    /// String
    String(String),
    /// Ordered set of nodes
    NodeSet(Vec<NodeRef>),
}

impl Value {
    /// An empty node-set
    #[must_use]
    pub fn empty() -> Self {
        Value::NodeSet(Vec::new())
    }

    /// XPath `boolean()` coercion; a node-set is true when non-empty
    #[must_use]
    pub fn boolean(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::NodeSet(nodes) => !nodes.is_empty(),
        }
    }

    /// Kind name for diagnostics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::NodeSet(_) => "node-set",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// XPath `number()` coercion of a string; non-numeric text is NaN
#[must_use]
pub fn number_from_str(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// XPath string rendering of a number; integral values drop the fraction
#[must_use]
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
