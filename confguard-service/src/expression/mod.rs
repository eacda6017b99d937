//! Constraint expression language
//!
//! An XPath-1.0 subset with the YANG extension functions, split into a
//! parser producing a typed AST and an evaluator running against the
//! instance tree. Parsing happens once at deployment; evaluation runs per
//! impacted node during validation.

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod value;

pub use ast::{Axis, BinaryOp, Expr, Function, LocationPath, LocationStep, NameTest};
pub use error::{EvaluationError, ParseError};
pub use evaluator::{EvalContext, Evaluator};
pub use parser::Parser;
pub use value::{NodeRef, Value};
