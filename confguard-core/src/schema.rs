//! The schema registry: an arena of immutable schema nodes
//!
//! Schema nodes are indexed by integer id; parent/child relations and the
//! leafref dependency graph work over ids, so reference cycles in the
//! schema never become ownership cycles. A registry is built once (by the
//! external YANG frontend, or programmatically through [`SchemaBuilder`])
//! and shared read-only across concurrent validations.

use crate::error::ModelError;
use crate::path::{QName, SchemaPath};
use crate::value::Scalar;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Arena index of a schema node within one registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaNodeId(pub u32);

impl SchemaNodeId {
    /// Arena slot of this id
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Leaf type descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeDescriptor {
    /// String, optionally restricted by ECMA-style regex patterns that the
    /// value must fully match
    String {
        /// Patterns the value must satisfy (all of them)
        patterns: Vec<String>,
    },
    /// Signed integer
    Int,
    /// Unsigned integer
    Uint,
    /// decimal64
    Decimal,
    /// Boolean
    Boolean,
    /// The `empty` type
    Empty,
    /// Enumeration with declared labels and ordinal values
    Enumeration {
        /// `(label, ordinal)` pairs in declaration order
        values: Vec<(String, i64)>,
    },
    /// `bits` with declared bit labels
    Bits {
        /// Declared bit labels
        bits: Vec<String>,
    },
    /// Identity reference constrained to descendants of a base identity
    IdentityRef {
        /// Base identity
        base: QName,
    },
    /// Leaf reference: valid values are those present at the target path
    Leafref {
        /// Target path expression, as declared in the schema
        path: String,
    },
    /// Union of member types, tried in declaration order
    Union {
        /// Member types
        members: Vec<TypeDescriptor>,
    },
}

impl TypeDescriptor {
    /// Plain unrestricted string
    #[must_use]
    pub fn string() -> Self {
        TypeDescriptor::String { patterns: Vec::new() }
    }

    /// String restricted by one pattern
    pub fn pattern(pattern: impl Into<String>) -> Self {
        TypeDescriptor::String {
            patterns: vec![pattern.into()],
        }
    }

    /// Enumeration with ordinals assigned in declaration order
    pub fn enumeration<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
        TypeDescriptor::Enumeration {
            values: labels
                .into_iter()
                .enumerate()
                .map(|(i, l)| (l.into(), i as i64))
                .collect(),
        }
    }

    /// The leafref target path, when this is (or contains) a leafref
    #[must_use]
    pub fn leafref_path(&self) -> Option<&str> {
        match self {
            TypeDescriptor::Leafref { path } => Some(path),
            TypeDescriptor::Union { members } => {
                members.iter().find_map(TypeDescriptor::leafref_path)
            }
            _ => None,
        }
    }
}

/// Kind of a constraint expression attached to a schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// `must`: constrains configuration validity
    Must,
    /// `when`: constrains whether the node may exist at all
    When,
}

/// A declared `must`/`when` expression with optional custom error fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Must or when
    pub kind: ConstraintKind,
    /// The expression text exactly as declared
    pub expression: String,
    /// Custom `error-app-tag`, overriding the generated default
    pub error_app_tag: Option<String>,
    /// Custom `error-message`, overriding the generated default
    pub error_message: Option<String>,
}

impl Constraint {
    /// A plain `must` constraint
    pub fn must(expression: impl Into<String>) -> Self {
        Self {
            kind: ConstraintKind::Must,
            expression: expression.into(),
            error_app_tag: None,
            error_message: None,
        }
    }

    /// A plain `when` constraint
    pub fn when(expression: impl Into<String>) -> Self {
        Self {
            kind: ConstraintKind::When,
            expression: expression.into(),
            error_app_tag: None,
            error_message: None,
        }
    }

    /// Attach a custom error-app-tag
    #[must_use]
    pub fn with_app_tag(mut self, tag: impl Into<String>) -> Self {
        self.error_app_tag = Some(tag.into());
        self
    }

    /// Attach a custom error-message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// How a mount point selects its mounted registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountRule {
    /// Always mounts the registry registered under the empty discriminator
    Static,
    /// The value of a named sibling (or ancestor) leaf selects the registry
    KeyedBy {
        /// Qualified name of the discriminator leaf, resolved against
        /// siblings first, then ancestors
        leaf: QName,
    },
}

/// Per-kind payload of a schema node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaNodeKind {
    /// Interior container node
    Container {
        /// True for presence containers
        presence: bool,
    },
    /// Keyed list
    List {
        /// Key-leaf names in declaration order
        keys: Vec<String>,
        /// Lower cardinality bound
        min_elements: Option<u32>,
        /// Upper cardinality bound
        max_elements: Option<u32>,
    },
    /// Leaf with a single typed value
    Leaf {
        /// Type descriptor
        type_descriptor: TypeDescriptor,
        /// Whether the leaf must be present
        mandatory: bool,
        /// Default injected by the caller after a clean validation pass
        default: Option<Scalar>,
    },
    /// Leaf-list: an ordered set of scalar values
    LeafList {
        /// Type descriptor of the values
        type_descriptor: TypeDescriptor,
        /// Lower cardinality bound
        min_elements: Option<u32>,
        /// Upper cardinality bound
        max_elements: Option<u32>,
        /// Whether entry order is user-defined
        ordered_by_user: bool,
    },
    /// Choice: at most one case subtree may be present
    Choice {
        /// Whether one case must be selected
        mandatory: bool,
    },
    /// Case alternative under a choice
    Case,
    /// RPC input subtree
    RpcInput,
    /// RPC output subtree
    RpcOutput,
}

/// One immutable schema node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaNode {
    /// Arena id within the owning registry
    pub id: SchemaNodeId,
    /// Qualified name
    pub qname: QName,
    /// Parent id, `None` for roots
    pub parent: Option<SchemaNodeId>,
    /// Per-kind payload
    pub kind: SchemaNodeKind,
    /// Child ids in declaration order
    pub children: Vec<SchemaNodeId>,
    /// Declared must/when expressions in declaration order
    pub constraints: Vec<Constraint>,
    /// False for state (`config false`) nodes
    pub config: bool,
    /// Present on schema-mount points
    pub mount: Option<MountRule>,
}

impl SchemaNode {
    /// The declared key-leaf names, for lists
    #[must_use]
    pub fn list_keys(&self) -> &[String] {
        match &self.kind {
            SchemaNodeKind::List { keys, .. } => keys,
            _ => &[],
        }
    }

    /// The leaf/leaf-list type descriptor, if any
    #[must_use]
    pub fn type_descriptor(&self) -> Option<&TypeDescriptor> {
        match &self.kind {
            SchemaNodeKind::Leaf { type_descriptor, .. }
            | SchemaNodeKind::LeafList { type_descriptor, .. } => Some(type_descriptor),
            _ => None,
        }
    }

    /// Whether this node is a leaf or leaf-list carrying a leafref type
    #[must_use]
    pub fn leafref_path(&self) -> Option<&str> {
        self.type_descriptor().and_then(TypeDescriptor::leafref_path)
    }

    /// Whether instances of this node carry data (not choice/case)
    #[must_use]
    pub fn is_data_node(&self) -> bool {
        !matches!(self.kind, SchemaNodeKind::Choice { .. } | SchemaNodeKind::Case)
    }
}

/// Identity base/derived hierarchy supplied by the schema source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityHierarchy {
    /// identity -> declared base identity
    bases: HashMap<QName, Option<QName>>,
}

impl IdentityHierarchy {
    /// Declare an identity with an optional base
    pub fn declare(&mut self, identity: QName, base: Option<QName>) {
        self.bases.insert(identity, base);
    }

    /// True iff `identity` is a strict descendant of `base`
    #[must_use]
    pub fn is_derived_from(&self, identity: &QName, base: &QName) -> bool {
        let mut cursor = self.bases.get(identity).and_then(Clone::clone);
        while let Some(current) = cursor {
            if &current == base {
                return true;
            }
            cursor = self.bases.get(&current).and_then(Clone::clone);
        }
        false
    }

    /// True iff `identity` is `base` or a descendant of it
    #[must_use]
    pub fn is_derived_from_or_self(&self, identity: &QName, base: &QName) -> bool {
        identity == base || self.is_derived_from(identity, base)
    }
}

/// A deployed, immutable schema registry
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    name: String,
    nodes: Vec<SchemaNode>,
    roots: Vec<SchemaNodeId>,
    identities: IdentityHierarchy,
    /// (mount-point id, discriminator value) -> mounted registry
    mounted: HashMap<(SchemaNodeId, String), Arc<SchemaRegistry>>,
}

impl SchemaRegistry {
    /// Registry name (usually the top-level module set name)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node by arena id
    #[must_use]
    pub fn node(&self, id: SchemaNodeId) -> &SchemaNode {
        &self.nodes[id.index()]
    }

    /// All node ids in arena order
    pub fn node_ids(&self) -> impl Iterator<Item = SchemaNodeId> + '_ {
        (0..self.nodes.len() as u32).map(SchemaNodeId)
    }

    /// Top-level schema node ids
    #[must_use]
    pub fn roots(&self) -> &[SchemaNodeId] {
        &self.roots
    }

    /// Identity hierarchy for `derived-from(-or-self)`
    #[must_use]
    pub fn identities(&self) -> &IdentityHierarchy {
        &self.identities
    }

    /// Resolve a direct child by qualified name, descending transparently
    /// through choice and case nodes
    #[must_use]
    pub fn child_by_qname(&self, parent: Option<SchemaNodeId>, qname: &QName) -> Option<SchemaNodeId> {
        let candidates: &[SchemaNodeId] = match parent {
            Some(id) => &self.node(id).children,
            None => &self.roots,
        };
        for &child in candidates {
            let node = self.node(child);
            if node.is_data_node() {
                if &node.qname == qname {
                    return Some(child);
                }
            } else if let Some(found) = self.child_by_qname(Some(child), qname) {
                return Some(found);
            }
        }
        None
    }

    /// Resolve an absolute schema path to a node id
    #[must_use]
    pub fn find(&self, path: &SchemaPath) -> Option<SchemaNodeId> {
        let mut cursor: Option<SchemaNodeId> = None;
        for qname in path.steps() {
            cursor = Some(self.child_by_qname(cursor, qname)?);
        }
        cursor
    }

    /// The absolute schema path of a node, skipping choice/case steps
    #[must_use]
    pub fn path_of(&self, id: SchemaNodeId) -> SchemaPath {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current);
            if node.is_data_node() {
                names.push(node.qname.clone());
            }
            cursor = node.parent;
        }
        names.reverse();
        SchemaPath::from_steps(names)
    }

    /// The nearest data-node ancestor (skipping choice/case), if any
    #[must_use]
    pub fn data_parent(&self, id: SchemaNodeId) -> Option<SchemaNodeId> {
        let mut cursor = self.node(id).parent;
        while let Some(current) = cursor {
            if self.node(current).is_data_node() {
                return Some(current);
            }
            cursor = self.node(current).parent;
        }
        None
    }

    /// The `(choice, case)` pair a node directly sits under, if any
    #[must_use]
    pub fn case_of(&self, id: SchemaNodeId) -> Option<(SchemaNodeId, SchemaNodeId)> {
        let parent = self.node(id).parent?;
        let node = self.node(parent);
        if matches!(node.kind, SchemaNodeKind::Case) {
            let choice = node.parent?;
            return Some((choice, parent));
        }
        None
    }

    /// The registry mounted at `mount_point` for a discriminator value
    /// (`""` for static mounts)
    #[must_use]
    pub fn mounted_registry(
        &self,
        mount_point: SchemaNodeId,
        discriminator: &str,
    ) -> Option<Arc<SchemaRegistry>> {
        self.mounted
            .get(&(mount_point, discriminator.to_string()))
            .cloned()
    }
}

/// Fluent builder for programmatic registry construction
///
/// The YANG frontend is an external collaborator; tests and embedders build
/// registries through this API instead.
pub struct SchemaBuilder {
    name: String,
    nodes: Vec<SchemaNode>,
    roots: Vec<SchemaNodeId>,
    identities: IdentityHierarchy,
    mounted: HashMap<(SchemaNodeId, String), Arc<SchemaRegistry>>,
    names: HashMap<(Option<SchemaNodeId>, QName), SchemaNodeId>,
}

impl SchemaBuilder {
    /// Start a new registry
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            roots: Vec::new(),
            identities: IdentityHierarchy::default(),
            mounted: HashMap::new(),
            names: HashMap::new(),
        }
    }

    fn push(
        &mut self,
        parent: Option<SchemaNodeId>,
        qname: QName,
        kind: SchemaNodeKind,
    ) -> Result<SchemaNodeId, ModelError> {
        let key = (parent, qname.clone());
        if self.names.contains_key(&key) {
            return Err(ModelError::DuplicateSchemaChild {
                name: qname.to_string(),
            });
        }
        let id = SchemaNodeId(self.nodes.len() as u32);
        self.nodes.push(SchemaNode {
            id,
            qname,
            parent,
            kind,
            children: Vec::new(),
            constraints: Vec::new(),
            config: true,
            mount: None,
        });
        match parent {
            Some(p) => self.nodes[p.index()].children.push(id),
            None => self.roots.push(id),
        }
        self.names.insert(key, id);
        Ok(id)
    }

    /// Add a container
    ///
    /// # Errors
    ///
    /// Returns an error when a sibling with the same name already exists.
    pub fn container(
        &mut self,
        parent: Option<SchemaNodeId>,
        module: &str,
        name: &str,
    ) -> Result<SchemaNodeId, ModelError> {
        self.push(
            parent,
            QName::new(module, name),
            SchemaNodeKind::Container { presence: false },
        )
    }

    /// Add a keyed list
    ///
    /// # Errors
    ///
    /// Returns an error when a sibling with the same name already exists.
    pub fn list(
        &mut self,
        parent: Option<SchemaNodeId>,
        module: &str,
        name: &str,
        keys: &[&str],
    ) -> Result<SchemaNodeId, ModelError> {
        self.push(
            parent,
            QName::new(module, name),
            SchemaNodeKind::List {
                keys: keys.iter().map(ToString::to_string).collect(),
                min_elements: None,
                max_elements: None,
            },
        )
    }

    /// Add a leaf
    ///
    /// # Errors
    ///
    /// Returns an error when a sibling with the same name already exists.
    pub fn leaf(
        &mut self,
        parent: Option<SchemaNodeId>,
        module: &str,
        name: &str,
        type_descriptor: TypeDescriptor,
    ) -> Result<SchemaNodeId, ModelError> {
        self.push(
            parent,
            QName::new(module, name),
            SchemaNodeKind::Leaf {
                type_descriptor,
                mandatory: false,
                default: None,
            },
        )
    }

    /// Add a leaf-list
    ///
    /// # Errors
    ///
    /// Returns an error when a sibling with the same name already exists.
    pub fn leaf_list(
        &mut self,
        parent: Option<SchemaNodeId>,
        module: &str,
        name: &str,
        type_descriptor: TypeDescriptor,
    ) -> Result<SchemaNodeId, ModelError> {
        self.push(
            parent,
            QName::new(module, name),
            SchemaNodeKind::LeafList {
                type_descriptor,
                min_elements: None,
                max_elements: None,
                ordered_by_user: false,
            },
        )
    }

    /// Add a choice node
    ///
    /// # Errors
    ///
    /// Returns an error when a sibling with the same name already exists.
    pub fn choice(
        &mut self,
        parent: Option<SchemaNodeId>,
        module: &str,
        name: &str,
    ) -> Result<SchemaNodeId, ModelError> {
        self.push(
            parent,
            QName::new(module, name),
            SchemaNodeKind::Choice { mandatory: false },
        )
    }

    /// Add a case under a choice
    ///
    /// # Errors
    ///
    /// Returns an error when a sibling with the same name already exists.
    pub fn case(
        &mut self,
        choice: SchemaNodeId,
        module: &str,
        name: &str,
    ) -> Result<SchemaNodeId, ModelError> {
        self.push(Some(choice), QName::new(module, name), SchemaNodeKind::Case)
    }

    /// Mark a leaf mandatory
    pub fn mandatory(&mut self, id: SchemaNodeId) {
        if let SchemaNodeKind::Leaf { mandatory, .. } = &mut self.nodes[id.index()].kind {
            *mandatory = true;
        } else if let SchemaNodeKind::Choice { mandatory } = &mut self.nodes[id.index()].kind {
            *mandatory = true;
        }
    }

    /// Set a leaf default value
    pub fn default_value(&mut self, id: SchemaNodeId, value: Scalar) {
        if let SchemaNodeKind::Leaf { default, .. } = &mut self.nodes[id.index()].kind {
            *default = Some(value);
        }
    }

    /// Set list/leaf-list cardinality bounds
    pub fn elements(&mut self, id: SchemaNodeId, min: Option<u32>, max: Option<u32>) {
        match &mut self.nodes[id.index()].kind {
            SchemaNodeKind::List {
                min_elements,
                max_elements,
                ..
            }
            | SchemaNodeKind::LeafList {
                min_elements,
                max_elements,
                ..
            } => {
                *min_elements = min;
                *max_elements = max;
            }
            _ => {}
        }
    }

    /// Mark a node as state data (`config false`)
    pub fn state(&mut self, id: SchemaNodeId) {
        self.nodes[id.index()].config = false;
    }

    /// Attach a constraint to a node
    pub fn constraint(&mut self, id: SchemaNodeId, constraint: Constraint) {
        self.nodes[id.index()].constraints.push(constraint);
    }

    /// Declare an identity
    pub fn identity(&mut self, identity: QName, base: Option<QName>) {
        self.identities.declare(identity, base);
    }

    /// Mark a container as a mount point
    pub fn mount_point(&mut self, id: SchemaNodeId, rule: MountRule) {
        self.nodes[id.index()].mount = Some(rule);
    }

    /// Register the registry mounted for a discriminator value
    /// (use `""` for static mounts)
    pub fn mount_registry(
        &mut self,
        mount_point: SchemaNodeId,
        discriminator: impl Into<String>,
        registry: Arc<SchemaRegistry>,
    ) {
        self.mounted
            .insert((mount_point, discriminator.into()), registry);
    }

    /// Finish, producing the shared immutable registry
    #[must_use]
    pub fn build(self) -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry {
            name: self.name,
            nodes: self.nodes,
            roots: self.roots,
            identities: self.identities,
            mounted: self.mounted,
        })
    }
}

/// Ordered children of a schema node as `(qname, id)` pairs, with
/// choice/case nodes flattened to their data descendants
#[must_use]
pub fn data_children(registry: &SchemaRegistry, parent: Option<SchemaNodeId>) -> IndexMap<QName, SchemaNodeId> {
    let mut out = IndexMap::new();
    collect_data_children(registry, parent, &mut out);
    out
}

fn collect_data_children(
    registry: &SchemaRegistry,
    parent: Option<SchemaNodeId>,
    out: &mut IndexMap<QName, SchemaNodeId>,
) {
    let children: &[SchemaNodeId] = match parent {
        Some(id) => &registry.node(id).children,
        None => registry.roots(),
    };
    for &child in children {
        let node = registry.node(child);
        if node.is_data_node() {
            out.insert(node.qname.clone(), child);
        } else {
            collect_data_children(registry, Some(child), out);
        }
    }
}
