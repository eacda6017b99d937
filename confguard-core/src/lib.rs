//! Core types for YANG-schema-driven configuration constraint validation
//!
//! This crate carries the data model shared by the confguard engine and its
//! embedders:
//!
//! - Namespace-qualified schema paths and keyed instance paths
//! - Scalar leaf values with XPath-style coercions
//! - The schema registry: an arena of schema nodes with type descriptors,
//!   constraint declarations, identity hierarchies and mount rules
//! - The instance tree: the in-memory configuration being validated
//! - RFC-6241-style error records produced by validation
//! - Validation settings and the narrow collaborator traits the engine
//!   consumes (state-data retrieval)
//!
//! The engine itself (expression evaluation, dependency resolution,
//! orchestration, schema mount) lives in `confguard-service`.

pub mod error;
pub mod instance;
pub mod path;
pub mod schema;
pub mod settings;
pub mod traits;
pub mod value;

pub use error::{ErrorSeverity, ErrorTag, ErrorType, ModelError, Violation};
pub use instance::{Change, ChangeKind, ChangeSet, InstanceNode, InstancePayload, InstanceTree, NodeId};
pub use path::{InstancePath, InstanceStep, QName, SchemaPath};
pub use schema::{
    data_children, Constraint, ConstraintKind, IdentityHierarchy, MountRule, SchemaBuilder,
    SchemaNode, SchemaNodeId, SchemaNodeKind, SchemaRegistry, TypeDescriptor,
};
pub use settings::{ReportMode, ValidationSettings};
pub use traits::{NoStateData, StateDataProvider};
pub use value::Scalar;

/// Convenience result alias for model-level operations
pub type Result<T> = std::result::Result<T, ModelError>;
