//! Abstract syntax tree for constraint expressions
//!
//! The grammar is the XPath-1.0 subset YANG must/when/leafref expressions
//! use: boolean and arithmetic operators, absolute and relative location
//! paths with predicates, and a closed set of functions. Function names
//! resolve at parse time; an unknown name is a parse error, never a
//! runtime dispatch miss.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operators, loosest-binding first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Logical `or`
    Or,
    /// Logical `and`
    And,
    /// Equality (`=`)
    Eq,
    /// Inequality (`!=`)
    NotEq,
    /// Less than
    Lt,
    /// Greater than
    Gt,
    /// Less or equal
    LtEq,
    /// Greater or equal
    GtEq,
    /// Addition
    Add,
    /// Subtraction
    Subtract,
    /// Multiplication
    Multiply,
    /// XPath `div`
    Div,
    /// XPath `mod`
    Mod,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
        };
        write!(f, "{text}")
    }
}

/// The closed function set known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Function {
    /// `boolean(object)`
    Boolean,
    /// `not(boolean)`
    Not,
    /// `true()`
    True,
    /// `false()`
    False,
    /// `number(object)`
    Number,
    /// `floor(number)`
    Floor,
    /// `ceiling(number)`
    Ceiling,
    /// `round(number)`, half-up
    Round,
    /// `concat(string, string, ...)`
    Concat,
    /// `contains(string, string)`
    Contains,
    /// `string-length(string?)`
    StringLength,
    /// `substring-before(string, string)`
    SubstringBefore,
    /// `namespace-uri(node-set?)`
    NamespaceUri,
    /// `local-name(node-set?)`
    LocalName,
    /// `string(object?)`
    String,
    /// `count(node-set)`
    Count,
    /// `current()`
    Current,
    /// `derived-from(node-set, identity)`
    DerivedFrom,
    /// `derived-from-or-self(node-set, identity)`
    DerivedFromOrSelf,
    /// `enum-value(node-set)`
    EnumValue,
    /// `re-match(value, pattern)`
    ReMatch,
    /// `bit-is-set(node-set, bit-name)`
    BitIsSet,
}

impl Function {
    /// Resolve a function name; `None` for names outside the closed set
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => Function::Boolean,
            "not" => Function::Not,
            "true" => Function::True,
            "false" => Function::False,
            "number" => Function::Number,
            "floor" => Function::Floor,
            "ceiling" => Function::Ceiling,
            "round" => Function::Round,
            "concat" => Function::Concat,
            "contains" => Function::Contains,
            "string-length" => Function::StringLength,
            "substring-before" => Function::SubstringBefore,
            "namespace-uri" => Function::NamespaceUri,
            "local-name" => Function::LocalName,
            "string" => Function::String,
            "count" => Function::Count,
            "current" => Function::Current,
            "derived-from" => Function::DerivedFrom,
            "derived-from-or-self" => Function::DerivedFromOrSelf,
            "enum-value" => Function::EnumValue,
            "re-match" => Function::ReMatch,
            "bit-is-set" => Function::BitIsSet,
            _ => return None,
        })
    }

    /// The declared function name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Function::Boolean => "boolean",
            Function::Not => "not",
            Function::True => "true",
            Function::False => "false",
            Function::Number => "number",
            Function::Floor => "floor",
            Function::Ceiling => "ceiling",
            Function::Round => "round",
            Function::Concat => "concat",
            Function::Contains => "contains",
            Function::StringLength => "string-length",
            Function::SubstringBefore => "substring-before",
            Function::NamespaceUri => "namespace-uri",
            Function::LocalName => "local-name",
            Function::String => "string",
            Function::Count => "count",
            Function::Current => "current",
            Function::DerivedFrom => "derived-from",
            Function::DerivedFromOrSelf => "derived-from-or-self",
            Function::EnumValue => "enum-value",
            Function::ReMatch => "re-match",
            Function::BitIsSet => "bit-is-set",
        }
    }
}

/// A node name test, optionally module-qualified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameTest {
    /// Module prefix; an unprefixed name matches within the context module
    pub module: Option<String>,
    /// Local name
    pub name: String,
}

impl fmt::Display for NameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{module}:{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Step axis: only the abbreviated child/self/parent axes occur in YANG
/// constraint expressions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    /// `..`
    Parent,
    /// `.`
    SelfNode,
    /// A child name test
    Child(NameTest),
}

/// One location step with its predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationStep {
    /// The step axis
    pub axis: Axis,
    /// Predicate expressions, applied in order
    pub predicates: Vec<Expr>,
}

impl LocationStep {
    /// A predicate-free step
    #[must_use]
    pub fn plain(axis: Axis) -> Self {
        Self {
            axis,
            predicates: Vec::new(),
        }
    }
}

impl fmt::Display for LocationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.axis {
            Axis::Parent => write!(f, "..")?,
            Axis::SelfNode => write!(f, ".")?,
            Axis::Child(name) => write!(f, "{name}")?,
        }
        for predicate in &self.predicates {
            write!(f, "[{predicate}]")?;
        }
        Ok(())
    }
}

/// An absolute or relative location path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPath {
    /// True for paths starting at the tree root
    pub absolute: bool,
    /// Ordered steps
    pub steps: Vec<LocationStep>,
}

impl fmt::Display for LocationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "/")?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

/// A constraint expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// String literal
    Literal(String),
    /// Location path
    Path(LocationPath),
    /// Function call
    Call {
        /// Resolved function
        function: Function,
        /// Arguments
        args: Vec<Expr>,
    },
    /// Path continuation off a filter expression, e.g. `current()/../key`
    PathFrom {
        /// The base expression, evaluated to a node-set
        base: Box<Expr>,
        /// Steps applied from those nodes
        steps: Vec<LocationStep>,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Unary minus
    Negate(Box<Expr>),
}

impl Expr {
    /// Depth of the expression tree
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Expr::Number(_) | Expr::Literal(_) | Expr::Path(_) => 1,
            Expr::Negate(inner) => 1 + inner.depth(),
            Expr::Call { args, .. } => 1 + args.iter().map(Expr::depth).max().unwrap_or(0),
            Expr::PathFrom { base, .. } => 1 + base.depth(),
            Expr::Binary { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Literal(s) => write!(f, "\"{s}\""),
            Expr::Path(path) => write!(f, "{path}"),
            Expr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::PathFrom { base, steps } => {
                write!(f, "{base}")?;
                for step in steps {
                    write!(f, "/{step}")?;
                }
                Ok(())
            }
            Expr::Binary { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::Negate(inner) => write!(f, "-{inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_function_names_round_trip() {
        for function in [
            Function::Boolean,
            Function::SubstringBefore,
            Function::DerivedFromOrSelf,
            Function::ReMatch,
            Function::BitIsSet,
        ] {
            assert_eq!(Function::from_name(function.name()), Some(function));
        }
        assert_eq!(Function::from_name("starts-with"), None);
    }

    #[test]
    fn test_location_path_display() {
        let path = LocationPath {
            absolute: false,
            steps: vec![
                LocationStep::plain(Axis::Parent),
                LocationStep {
                    axis: Axis::Child(NameTest {
                        module: None,
                        name: "list1".to_string(),
                    }),
                    predicates: vec![Expr::Binary {
                        op: BinaryOp::Eq,
                        left: Box::new(Expr::Path(LocationPath {
                            absolute: false,
                            steps: vec![LocationStep::plain(Axis::Child(NameTest {
                                module: None,
                                name: "key1".to_string(),
                            }))],
                        })),
                        right: Box::new(Expr::Call {
                            function: Function::Current,
                            args: Vec::new(),
                        }),
                    }],
                },
            ],
        };
        assert_eq!(path.to_string(), "../list1[key1 = current()]");
    }

    #[test]
    fn test_depth_counts_nesting() {
        let expr = Expr::Binary {
            op: BinaryOp::Gt,
            left: Box::new(Expr::Call {
                function: Function::Count,
                args: vec![Expr::Path(LocationPath {
                    absolute: false,
                    steps: vec![LocationStep::plain(Axis::SelfNode)],
                })],
            }),
            right: Box::new(Expr::Number(1.0)),
        };
        assert_eq!(expr.depth(), 3);
    }
}
