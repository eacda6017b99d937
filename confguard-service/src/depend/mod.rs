//! Reverse dependency index and impact resolution

pub mod index;
pub mod template;

pub use index::{
    CompiledConstraint, CompiledLeafref, DependencyIndex, DeploymentError, ImpactEdge,
};
pub use template::{collect_sources, resolve_schema_path, trace_schema_path, PathResolution, SourceRef};
