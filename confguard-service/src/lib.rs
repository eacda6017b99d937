//! Constraint-validation engine for YANG-schema-driven configuration
//!
//! Validates configuration change-sets against a deployed schema registry:
//! structural rules (mandatory presence, cardinality, choice exclusivity,
//! type restrictions), must/when expressions in an XPath-1.0 subset,
//! leafref referential integrity, and schema-mounted subtrees. Violations
//! are reported as RFC-6241-style error records.
//!
//! The entry point is [`ValidationEngine`]: build one per schema registry
//! at deployment time, then call [`ValidationEngine::validate`] per
//! change-set. Engines are immutable after construction and shareable
//! across concurrent validations of independent trees.

pub mod depend;
pub mod expression;
pub mod mount;
pub mod validator;

pub use depend::{DependencyIndex, DeploymentError};
pub use expression::{EvalContext, EvaluationError, Evaluator, ParseError, Parser};
pub use mount::{MountBinding, MountCoordinator, MountResolution};
pub use validator::{ValidationEngine, ValidationOutcome};
