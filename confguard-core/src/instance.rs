//! The instance tree: the in-memory configuration under validation
//!
//! Nodes live in an arena indexed by [`NodeId`]; parent back-references are
//! plain ids, so the tree has no ownership cycles. A single tagged payload
//! enum covers containers, lists, list entries, leaves and leaf-lists;
//! navigation code matches on the tag.
//!
//! The external edit-applier mutates the tree (create/merge/replace/delete)
//! before validation; the validation core only reads it. Deleted nodes stay
//! in the arena as tombstones so that impact resolution can still map a
//! deleted path back to its schema node.

use crate::error::ModelError;
use crate::path::{InstancePath, InstanceStep, QName};
use crate::schema::{SchemaNode, SchemaNodeId, SchemaNodeKind, SchemaRegistry};
use crate::value::Scalar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Arena index of an instance node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Arena slot of this id
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which registry and schema node an instance node is typed by
///
/// `registry` indexes into the tree's registry table: 0 is the host
/// registry, further entries are attached at mount points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaRef {
    /// Index into the tree's registry table
    pub registry: u16,
    /// Schema node id within that registry
    pub node: SchemaNodeId,
}

/// Per-kind payload of an instance node
#[derive(Debug, Clone, PartialEq)]
pub enum InstancePayload {
    /// Container instance
    Container,
    /// List wrapper holding the entries of one schema list
    List,
    /// One list entry, pinned by its key tuple (canonical string values)
    ListEntry {
        /// `(key-leaf name, canonical value)` in key declaration order
        keys: Vec<(String, String)>,
    },
    /// Leaf with a single value
    Leaf {
        /// Current value
        value: Scalar,
    },
    /// Leaf-list wrapper holding the value entries
    LeafList,
    /// One leaf-list value entry
    LeafListEntry {
        /// Entry value
        value: Scalar,
    },
}

/// One node of the instance tree
#[derive(Debug, Clone)]
pub struct InstanceNode {
    /// Arena id
    pub id: NodeId,
    /// Parent id, `None` for roots
    pub parent: Option<NodeId>,
    /// Qualified name
    pub qname: QName,
    /// Schema typing of this node
    pub schema: SchemaRef,
    /// Per-kind payload
    pub payload: InstancePayload,
    /// Child ids in insertion order
    pub children: Vec<NodeId>,
    /// Tombstone flag set by `delete`
    pub deleted: bool,
}

impl InstanceNode {
    /// The scalar carried by a leaf or leaf-list entry
    #[must_use]
    pub fn value(&self) -> Option<&Scalar> {
        match &self.payload {
            InstancePayload::Leaf { value } | InstancePayload::LeafListEntry { value } => {
                Some(value)
            }
            _ => None,
        }
    }
}

/// Kind of a change-set entry, NETCONF edit-config operation semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Node was created
    Create,
    /// Node was merged (created-or-updated)
    Merge,
    /// Node subtree was replaced
    Replace,
    /// Node was deleted (error if absent)
    Delete,
    /// Node was removed (no error if absent)
    Remove,
}

impl ChangeKind {
    /// Whether this change removes data from the tree
    #[must_use]
    pub fn is_removal(self) -> bool {
        matches!(self, ChangeKind::Delete | ChangeKind::Remove)
    }
}

/// One touched instance path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Path of the touched node
    pub path: InstancePath,
    /// What happened to it
    pub kind: ChangeKind,
}

impl Change {
    /// Build a change entry
    #[must_use]
    pub fn new(path: InstancePath, kind: ChangeKind) -> Self {
        Self { path, kind }
    }
}

/// The set of instance-tree mutations one edit applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Touched paths in application order
    pub changes: Vec<Change>,
}

impl ChangeSet {
    /// An empty change-set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change
    pub fn push(&mut self, path: InstancePath, kind: ChangeKind) {
        self.changes.push(Change::new(path, kind));
    }

    /// Iterate the recorded changes
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Whether nothing was touched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// The configuration tree under validation
pub struct InstanceTree {
    registries: Vec<Arc<SchemaRegistry>>,
    nodes: Vec<InstanceNode>,
    roots: Vec<NodeId>,
}

impl InstanceTree {
    /// Create an empty tree typed by a host registry
    #[must_use]
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registries: vec![registry],
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// The host registry
    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registries[0]
    }

    /// Registry by table index
    #[must_use]
    pub fn registry_at(&self, index: u16) -> &Arc<SchemaRegistry> {
        &self.registries[index as usize]
    }

    /// All attached registries in table order, host first
    pub fn registries(&self) -> impl Iterator<Item = &Arc<SchemaRegistry>> {
        self.registries.iter()
    }

    /// Attach a mounted registry below a mount-point node, returning the
    /// registry table index children of that subtree are typed by
    pub fn attach_registry(&mut self, registry: Arc<SchemaRegistry>) -> u16 {
        // Reuse an existing slot when the same registry is mounted twice.
        for (i, existing) in self.registries.iter().enumerate() {
            if Arc::ptr_eq(existing, &registry) {
                return i as u16;
            }
        }
        self.registries.push(registry);
        (self.registries.len() - 1) as u16
    }

    /// Node by arena id
    #[must_use]
    pub fn node(&self, id: NodeId) -> &InstanceNode {
        &self.nodes[id.index()]
    }

    /// The schema registry and node typing an instance node
    #[must_use]
    pub fn schema_of(&self, id: NodeId) -> (&Arc<SchemaRegistry>, &SchemaNode) {
        let schema = self.node(id).schema;
        let registry = &self.registries[schema.registry as usize];
        (registry, registry.node(schema.node))
    }

    /// Top-level node ids, tombstones excluded
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().copied().filter(|&id| !self.node(id).deleted)
    }

    /// Live children of a node
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(|&c| !self.node(c).deleted)
    }

    /// Live children of a node, or roots when `id` is `None`
    pub fn children_or_roots(&self, id: Option<NodeId>) -> Vec<NodeId> {
        match id {
            Some(id) => self.children(id).collect(),
            None => self.roots().collect(),
        }
    }

    /// All live children with a given name (may be several for duplicate
    /// containers the applier let through; validation reports those)
    pub fn children_by_qname<'a>(
        &'a self,
        parent: Option<NodeId>,
        qname: &'a QName,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children_or_roots(parent)
            .into_iter()
            .filter(move |&c| &self.node(c).qname == qname)
    }

    /// First live child with a given name
    #[must_use]
    pub fn child_by_qname(&self, parent: Option<NodeId>, qname: &QName) -> Option<NodeId> {
        self.children_by_qname(parent, qname).next()
    }

    /// Find a list entry by its key tuple, under the list wrapper node
    #[must_use]
    pub fn list_entry(&self, list: NodeId, keys: &[(String, String)]) -> Option<NodeId> {
        self.children(list).find(|&entry| {
            matches!(&self.node(entry).payload,
                InstancePayload::ListEntry { keys: k } if k == keys)
        })
    }

    /// Compose the absolute instance path of a node
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> InstancePath {
        let mut steps = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current);
            match &node.payload {
                // List/leaf-list wrappers are invisible in paths; the entry
                // step carries the list name plus its predicate.
                InstancePayload::List | InstancePayload::LeafList => {}
                InstancePayload::ListEntry { keys } => {
                    steps.push(InstanceStep::keyed(node.qname.clone(), keys.clone()));
                }
                InstancePayload::LeafListEntry { value } => {
                    steps.push(InstanceStep::valued(node.qname.clone(), value.canonical()));
                }
                InstancePayload::Container | InstancePayload::Leaf { .. } => {
                    steps.push(InstanceStep::new(node.qname.clone()));
                }
            }
            cursor = node.parent;
        }
        steps.reverse();
        InstancePath::from_steps(steps)
    }

    /// Resolve an absolute instance path to a node id
    ///
    /// With `include_deleted` the lookup also walks tombstones, which impact
    /// resolution needs to map a deleted path back to its schema node.
    #[must_use]
    pub fn resolve(&self, path: &InstancePath, include_deleted: bool) -> Option<NodeId> {
        let mut cursor: Option<NodeId> = None;
        for step in path.steps() {
            let candidates: Vec<NodeId> = match cursor {
                Some(id) => self.all_children(id, include_deleted),
                None => self.all_roots(include_deleted),
            };
            let mut found = None;
            for candidate in candidates {
                let node = self.node(candidate);
                if node.qname != step.qname {
                    continue;
                }
                match &node.payload {
                    InstancePayload::List => {
                        // Descend through the wrapper into the keyed entry.
                        found = self
                            .all_children(candidate, include_deleted)
                            .into_iter()
                            .find(|&entry| {
                                matches!(&self.node(entry).payload,
                                    InstancePayload::ListEntry { keys }
                                        if keys.as_slice() == step.keys.as_slice())
                            });
                    }
                    InstancePayload::LeafList => {
                        found = self
                            .all_children(candidate, include_deleted)
                            .into_iter()
                            .find(|&entry| {
                                matches!(self.node(entry).value(),
                                    Some(v) if Some(v.canonical()) == step.value)
                            });
                    }
                    _ => {
                        if step.keys.is_empty() && step.value.is_none() {
                            found = Some(candidate);
                        }
                    }
                }
                if found.is_some() {
                    break;
                }
            }
            cursor = Some(found?);
        }
        cursor
    }

    fn all_children(&self, id: NodeId, include_deleted: bool) -> Vec<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(|&c| include_deleted || !self.node(c).deleted)
            .collect()
    }

    fn all_roots(&self, include_deleted: bool) -> Vec<NodeId> {
        self.roots
            .iter()
            .copied()
            .filter(|&c| include_deleted || !self.node(c).deleted)
            .collect()
    }

    /// All live data nodes typed by a given schema node of a given
    /// registry, in pre-order; list/leaf-list wrapper nodes are skipped in
    /// favor of their entries
    #[must_use]
    pub fn nodes_of_schema(&self, registry: &Arc<SchemaRegistry>, node: SchemaNodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.roots().collect();
        stack.reverse();
        while let Some(id) = stack.pop() {
            let instance = self.node(id);
            let owning = &self.registries[instance.schema.registry as usize];
            if Arc::ptr_eq(owning, registry)
                && instance.schema.node == node
                && !matches!(
                    instance.payload,
                    InstancePayload::List | InstancePayload::LeafList
                )
            {
                out.push(id);
            }
            let mut children: Vec<NodeId> = self.children(id).collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    // --- mutation API, used by the external edit-applier and tests ---

    fn resolve_child_schema(
        &self,
        parent: Option<NodeId>,
        module: &str,
        name: &str,
    ) -> Result<SchemaRef, ModelError> {
        let qname = QName::new(module, name);
        let (registry_idx, parent_schema) = match parent {
            Some(p) => {
                let node = self.node(p);
                (node.schema.registry, Some(node.schema.node))
            }
            None => (0, None),
        };
        let registry = &self.registries[registry_idx as usize];
        let schema_node = registry
            .child_by_qname(parent_schema, &qname)
            .ok_or_else(|| ModelError::UnknownSchemaChild {
                name: qname.to_string(),
                parent: parent_schema
                    .map(|p| registry.path_of(p).to_string())
                    .unwrap_or_else(|| "/".to_string()),
            })?;
        Ok(SchemaRef {
            registry: registry_idx,
            node: schema_node,
        })
    }

    fn push_node(
        &mut self,
        parent: Option<NodeId>,
        qname: QName,
        schema: SchemaRef,
        payload: InstancePayload,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(InstanceNode {
            id,
            parent,
            qname,
            schema,
            payload,
            children: Vec::new(),
            deleted: false,
        });
        match parent {
            Some(p) => self.nodes[p.index()].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Create a container child
    ///
    /// Duplicate containers are representable on purpose: the applier may
    /// let one through and structural validation reports it.
    ///
    /// # Errors
    ///
    /// Returns an error when the schema has no such child.
    pub fn add_container(
        &mut self,
        parent: Option<NodeId>,
        module: &str,
        name: &str,
    ) -> Result<NodeId, ModelError> {
        let schema = self.resolve_child_schema(parent, module, name)?;
        Ok(self.push_node(
            parent,
            QName::new(module, name),
            schema,
            InstancePayload::Container,
        ))
    }

    /// Create a container child typed by a mounted registry root
    ///
    /// # Errors
    ///
    /// Returns an error when the mounted registry has no such root.
    pub fn add_mounted_container(
        &mut self,
        parent: NodeId,
        registry_index: u16,
        module: &str,
        name: &str,
    ) -> Result<NodeId, ModelError> {
        let qname = QName::new(module, name);
        let registry = self.registries[registry_index as usize].clone();
        let schema_node = registry.child_by_qname(None, &qname).ok_or_else(|| {
            ModelError::UnknownSchemaChild {
                name: qname.to_string(),
                parent: format!("mounted registry '{}'", registry.name()),
            }
        })?;
        Ok(self.push_node(
            Some(parent),
            qname,
            SchemaRef {
                registry: registry_index,
                node: schema_node,
            },
            InstancePayload::Container,
        ))
    }

    /// Create (or fetch) a list entry, creating the wrapper node on demand
    ///
    /// # Errors
    ///
    /// Returns an error for unknown schema children, non-list schema nodes,
    /// or an incomplete key tuple.
    pub fn add_list_entry(
        &mut self,
        parent: Option<NodeId>,
        module: &str,
        name: &str,
        keys: &[(&str, Scalar)],
    ) -> Result<NodeId, ModelError> {
        let schema = self.resolve_child_schema(parent, module, name)?;
        let qname = QName::new(module, name);
        let registry = self.registries[schema.registry as usize].clone();
        let schema_node = registry.node(schema.node);
        let declared = schema_node.list_keys();
        if !matches!(schema_node.kind, SchemaNodeKind::List { .. }) {
            return Err(ModelError::NotAList {
                name: qname.to_string(),
            });
        }
        if declared.len() != keys.len()
            || declared.iter().zip(keys).any(|(d, (k, _))| d != k)
        {
            return Err(ModelError::BadKeyTuple {
                name: qname.to_string(),
                expected: declared.join(", "),
            });
        }
        let canonical: Vec<(String, String)> = keys
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.canonical()))
            .collect();

        let wrapper = match self.child_by_qname(parent, &qname) {
            Some(w) if matches!(self.node(w).payload, InstancePayload::List) => w,
            _ => self.push_node(parent, qname.clone(), schema, InstancePayload::List),
        };
        if let Some(existing) = self.list_entry(wrapper, &canonical) {
            return Ok(existing);
        }
        let entry = self.push_node(
            Some(wrapper),
            qname,
            schema,
            InstancePayload::ListEntry { keys: canonical },
        );
        // Key leaves materialize as ordinary leaf children of the entry.
        for (key, value) in keys {
            self.set_leaf(Some(entry), module, key, value.clone())?;
        }
        Ok(entry)
    }

    /// Set a leaf value, replacing an existing one
    ///
    /// # Errors
    ///
    /// Returns an error when the schema has no such child.
    pub fn set_leaf(
        &mut self,
        parent: Option<NodeId>,
        module: &str,
        name: &str,
        value: Scalar,
    ) -> Result<NodeId, ModelError> {
        let schema = self.resolve_child_schema(parent, module, name)?;
        let qname = QName::new(module, name);
        if let Some(existing) = self.child_by_qname(parent, &qname) {
            if let InstancePayload::Leaf { value: slot } = &mut self.nodes[existing.index()].payload
            {
                *slot = value;
                return Ok(existing);
            }
        }
        Ok(self.push_node(parent, qname, schema, InstancePayload::Leaf { value }))
    }

    /// Append a leaf-list value, creating the wrapper node on demand
    ///
    /// # Errors
    ///
    /// Returns an error when the schema has no such child.
    pub fn add_leaf_list_value(
        &mut self,
        parent: Option<NodeId>,
        module: &str,
        name: &str,
        value: Scalar,
    ) -> Result<NodeId, ModelError> {
        let schema = self.resolve_child_schema(parent, module, name)?;
        let qname = QName::new(module, name);
        let wrapper = match self.child_by_qname(parent, &qname) {
            Some(w) if matches!(self.node(w).payload, InstancePayload::LeafList) => w,
            _ => self.push_node(parent, qname.clone(), schema, InstancePayload::LeafList),
        };
        Ok(self.push_node(
            Some(wrapper),
            qname,
            schema,
            InstancePayload::LeafListEntry { value },
        ))
    }

    /// Tombstone a node and its whole subtree
    pub fn delete(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.nodes[current.index()].deleted = true;
            stack.extend(self.nodes[current.index()].children.iter().copied());
        }
    }

    /// Live descendant paths of a node, pre-order, the node itself included
    #[must_use]
    pub fn subtree_paths(&self, id: NodeId) -> Vec<InstancePath> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current);
            // Wrapper nodes have no path of their own.
            if !matches!(node.payload, InstancePayload::List | InstancePayload::LeafList) {
                out.push(self.path_of(current));
            }
            let mut children: Vec<NodeId> = self.children(current).collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }
}
