//! Schema mount coordination
//!
//! A mount-point container selects, per instance, one mounted registry via
//! its discriminator rule. Nested validation engines are built lazily and
//! cached per (mount point, discriminator value); the cache is populated
//! read-through with a single writer, so concurrent first hits never build
//! the same nested engine twice over each other's result.

use crate::validator::ValidationEngine;
use confguard_core::{
    InstancePath, InstanceTree, MountRule, NodeId, QName, SchemaNodeId, SchemaRegistry,
    ValidationSettings,
};
use crate::depend::DeploymentError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A resolved mount: which registry applies under which host node
#[derive(Debug, Clone)]
pub struct MountBinding {
    /// Instance path of the mount-point container
    pub host_path: InstancePath,
    /// Schema id of the mount-point node in the host registry
    pub mount_point: SchemaNodeId,
    /// Discriminator value that selected the registry (`""` for static)
    pub discriminator: String,
    /// The mounted registry
    pub registry: Arc<SchemaRegistry>,
}

/// Outcome of mount resolution at one instance node
#[derive(Debug, Clone)]
pub enum MountResolution {
    /// The node is not a mount point, or its discriminator leaf is absent
    NotMounted,
    /// The discriminator value names no registered mounted registry
    UnknownDiscriminator {
        /// The unmatched value
        discriminator: String,
    },
    /// A mounted registry applies
    Bound(MountBinding),
}

/// Lazily populated cache of nested validation engines
#[derive(Default)]
pub struct MountCoordinator {
    engines: RwLock<HashMap<(SchemaNodeId, String), Arc<ValidationEngine>>>,
}

impl MountCoordinator {
    /// Empty coordinator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve which mounted registry, if any, applies at `host`
    #[must_use]
    pub fn resolve_mount(&self, tree: &InstanceTree, host: NodeId) -> MountResolution {
        let (registry, schema) = tree.schema_of(host);
        let Some(rule) = &schema.mount else {
            return MountResolution::NotMounted;
        };
        let discriminator = match rule {
            MountRule::Static => String::new(),
            MountRule::KeyedBy { leaf } => {
                match discriminator_value(tree, host, leaf) {
                    Some(value) => value,
                    None => return MountResolution::NotMounted,
                }
            }
        };
        match registry.mounted_registry(schema.id, &discriminator) {
            Some(mounted) => MountResolution::Bound(MountBinding {
                host_path: tree.path_of(host),
                mount_point: schema.id,
                discriminator,
                registry: mounted,
            }),
            None => MountResolution::UnknownDiscriminator { discriminator },
        }
    }

    /// The nested engine for a binding, built on first use
    ///
    /// # Errors
    ///
    /// Returns the mounted registry's [`DeploymentError`] when its
    /// dependency index does not build.
    pub fn engine_for(
        &self,
        binding: &MountBinding,
        settings: &ValidationSettings,
    ) -> Result<Arc<ValidationEngine>, DeploymentError> {
        let key = (binding.mount_point, binding.discriminator.clone());
        if let Some(engine) = self.engines.read().get(&key) {
            return Ok(Arc::clone(engine));
        }
        let mut engines = self.engines.write();
        // Another writer may have populated the slot while we waited.
        if let Some(engine) = engines.get(&key) {
            return Ok(Arc::clone(engine));
        }
        debug!(
            registry = binding.registry.name(),
            discriminator = %binding.discriminator,
            "building nested validation engine"
        );
        let engine = Arc::new(ValidationEngine::new(
            Arc::clone(&binding.registry),
            settings.clone(),
        )?);
        engines.insert(key, Arc::clone(&engine));
        Ok(engine)
    }
}

impl std::fmt::Debug for MountCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountCoordinator")
            .field("cached", &self.engines.read().len())
            .finish()
    }
}

/// The discriminator leaf's value, searched among siblings first, then up
/// the ancestor chain; module and name must both match
fn discriminator_value(tree: &InstanceTree, host: NodeId, leaf: &QName) -> Option<String> {
    let mut scope = tree.node(host).parent;
    loop {
        for sibling in tree.children_or_roots(scope) {
            let node = tree.node(sibling);
            if &node.qname == leaf {
                if let Some(value) = node.value() {
                    return Some(value.canonical());
                }
            }
        }
        scope = match scope {
            Some(id) => tree.node(id).parent,
            None => return None,
        };
    }
}
