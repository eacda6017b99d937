//! Reverse dependency index
//!
//! Built once per schema registry at deployment time. Every must/when
//! expression and leafref declaration is parsed, its path operands resolved
//! to schema nodes, and the reads recorded as flat (source, target,
//! template) edges. Validation asks the index which constraint owners a
//! concrete change can impact; the answer may over-approximate but never
//! omits an owner.

use super::template::{self, PathResolution, SourceRef};
use crate::expression::{Expr, LocationPath, ParseError, Parser};
use confguard_core::{
    ChangeKind, ConstraintKind, InstancePath, InstanceTree, SchemaNodeId, SchemaNodeKind,
    SchemaRegistry, ValidationSettings,
};
use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// Errors that abort schema deployment
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeploymentError {
    /// A must/when expression failed to parse
    #[error("Cannot parse expression on node '{node}': {source}")]
    ExpressionParse {
        /// Schema path of the declaring node
        node: String,
        /// The parse failure
        #[source]
        source: ParseError,
    },

    /// A leafref path resolves to no schema node
    #[error("Leafref on node '{leafref}' does not resolve: '{path}'")]
    DanglingLeafref {
        /// Schema path of the leafref leaf
        leafref: String,
        /// The unresolvable path text
        path: String,
    },

    /// A leafref path resolves to a container or list
    #[error("Leafref on node '{leafref}' targets non-leaf node '{target}'")]
    LeafrefTargetNotLeaf {
        /// Schema path of the leafref leaf
        leafref: String,
        /// Schema path of the mis-targeted node
        target: String,
    },

    /// A configuration leafref targets a state-only node
    #[error("Configuration leafref on node '{leafref}' targets state node '{target}'")]
    LeafrefToStateNode {
        /// Schema path of the leafref leaf
        leafref: String,
        /// Schema path of the state target
        target: String,
    },

    /// The leafref dependency graph contains a cycle
    #[error("Circular leafref chain among: {}", .nodes.iter().cloned().collect::<Vec<_>>().join(", "))]
    LeafrefCycle {
        /// Schema paths of every node on a cycle, order-independent
        nodes: BTreeSet<String>,
    },
}

/// A must/when expression compiled at deployment time
#[derive(Debug, Clone)]
pub struct CompiledConstraint {
    /// Node declaring the constraint
    pub owner: SchemaNodeId,
    /// Must or when
    pub kind: ConstraintKind,
    /// The expression text as declared, reproduced verbatim in messages
    pub expression: String,
    /// Parsed form
    pub parsed: Expr,
    /// Declared error-app-tag override
    pub error_app_tag: Option<String>,
    /// Declared error-message override
    pub error_message: Option<String>,
}

/// A leafref declaration compiled at deployment time
#[derive(Debug, Clone)]
pub struct CompiledLeafref {
    /// The leafref leaf
    pub owner: SchemaNodeId,
    /// The resolved target leaf or leaf-list; `None` when the path leaves
    /// this registry across a mount boundary, in which case the target is
    /// checked per instance by the leafref phase
    pub target: Option<SchemaNodeId>,
    /// Parsed target path
    pub path: LocationPath,
    /// The path text as declared
    pub template: String,
}

/// One schema-level read edge
#[derive(Debug, Clone)]
pub struct ImpactEdge {
    /// The node being read
    pub source: SchemaNodeId,
    /// The node owning the reading constraint
    pub target: SchemaNodeId,
    /// The path text that reads the source
    pub template: String,
    /// Trailing child-step count of an ascend-then-descend read, used to
    /// anchor impact to the owning entry; `None` falls back to every
    /// owner instance
    pub descent: Option<usize>,
}

/// Immutable reverse-dependency index for one schema registry
#[derive(Debug)]
pub struct DependencyIndex {
    registry: Arc<SchemaRegistry>,
    constraints: Vec<CompiledConstraint>,
    by_owner: IndexMap<SchemaNodeId, Vec<usize>>,
    leafrefs: Vec<CompiledLeafref>,
    leafref_by_owner: IndexMap<SchemaNodeId, usize>,
    edges: Vec<ImpactEdge>,
    by_source: IndexMap<SchemaNodeId, Vec<usize>>,
    // Owners whose constraints read across a mount boundary; no schema
    // edge can describe those reads, so any change re-evaluates them.
    external_readers: BTreeSet<SchemaNodeId>,
}

impl DependencyIndex {
    /// Build the index by scanning every constraint and leafref declaration
    ///
    /// # Errors
    ///
    /// Returns a [`DeploymentError`] for unparseable expressions, dangling
    /// or mis-targeted leafrefs, and leafref cycles.
    pub fn build(
        registry: Arc<SchemaRegistry>,
        settings: &ValidationSettings,
    ) -> Result<Self, DeploymentError> {
        let parser = Parser::with_limits(settings.max_expression_depth, settings.max_expression_length);
        let mut index = Self {
            registry: Arc::clone(&registry),
            constraints: Vec::new(),
            by_owner: IndexMap::new(),
            leafrefs: Vec::new(),
            leafref_by_owner: IndexMap::new(),
            edges: Vec::new(),
            by_source: IndexMap::new(),
            external_readers: BTreeSet::new(),
        };

        for id in registry.node_ids() {
            let node = registry.node(id);
            for constraint in &node.constraints {
                let parsed = parser.parse(&constraint.expression).map_err(|source| {
                    DeploymentError::ExpressionParse {
                        node: registry.path_of(id).to_string(),
                        source,
                    }
                })?;
                let mut sources = Vec::new();
                let external = template::collect_sources(&registry, id, &parsed, &mut sources);
                for SourceRef { node: source, template, descent } in sources {
                    index.push_edge(source, id, template, descent);
                }
                if external {
                    index.external_readers.insert(id);
                }
                index
                    .by_owner
                    .entry(id)
                    .or_default()
                    .push(index.constraints.len());
                index.constraints.push(CompiledConstraint {
                    owner: id,
                    kind: constraint.kind,
                    expression: constraint.expression.clone(),
                    parsed,
                    error_app_tag: constraint.error_app_tag.clone(),
                    error_message: constraint.error_message.clone(),
                });
            }

            if let Some(path_text) = node.leafref_path() {
                index.compile_leafref(&parser, id, path_text)?;
            }
        }

        index.check_leafref_cycles()?;
        debug!(
            registry = registry.name(),
            constraints = index.constraints.len(),
            leafrefs = index.leafrefs.len(),
            edges = index.edges.len(),
            "dependency index built"
        );
        Ok(index)
    }

    fn push_edge(
        &mut self,
        source: SchemaNodeId,
        target: SchemaNodeId,
        template: String,
        descent: Option<usize>,
    ) {
        self.by_source
            .entry(source)
            .or_default()
            .push(self.edges.len());
        self.edges.push(ImpactEdge {
            source,
            target,
            template,
            descent,
        });
    }

    fn compile_leafref(
        &mut self,
        parser: &Parser,
        owner: SchemaNodeId,
        path_text: &str,
    ) -> Result<(), DeploymentError> {
        let owner_path = || self.registry.path_of(owner).to_string();
        let path = parser
            .parse_path(path_text)
            .map_err(|_| DeploymentError::DanglingLeafref {
                leafref: owner_path(),
                path: path_text.to_string(),
            })?;

        let target = match template::trace_schema_path(&self.registry, Some(owner), &path) {
            PathResolution::Resolved(target) => {
                let target_node = self.registry.node(target);
                if !matches!(
                    target_node.kind,
                    SchemaNodeKind::Leaf { .. } | SchemaNodeKind::LeafList { .. }
                ) {
                    return Err(DeploymentError::LeafrefTargetNotLeaf {
                        leafref: owner_path(),
                        target: self.registry.path_of(target).to_string(),
                    });
                }
                if self.registry.node(owner).config && !target_node.config {
                    return Err(DeploymentError::LeafrefToStateNode {
                        leafref: owner_path(),
                        target: self.registry.path_of(target).to_string(),
                    });
                }
                Some(target)
            }
            // The path crosses a mount boundary; the leafref phase checks
            // the referent against the shared tree per instance.
            PathResolution::Escapes => None,
            PathResolution::Dangling => {
                return Err(DeploymentError::DanglingLeafref {
                    leafref: owner_path(),
                    path: path_text.to_string(),
                });
            }
        };

        // Predicate reads inside the target path are impact sources too.
        let mut sources = Vec::new();
        template::collect_sources(
            &self.registry,
            owner,
            &Expr::Path(path.clone()),
            &mut sources,
        );
        for SourceRef { node: source, template, descent } in sources {
            self.push_edge(source, owner, template, descent);
        }

        self.leafref_by_owner.insert(owner, self.leafrefs.len());
        self.leafrefs.push(CompiledLeafref {
            owner,
            target,
            path,
            template: path_text.to_string(),
        });
        Ok(())
    }

    /// Cycle detection over the leafref owner-to-target graph
    fn check_leafref_cycles(&self) -> Result<(), DeploymentError> {
        let mut graph: DiGraph<SchemaNodeId, ()> = DiGraph::new();
        let mut vertices: HashMap<SchemaNodeId, NodeIndex> = HashMap::new();
        let mut vertex = |graph: &mut DiGraph<SchemaNodeId, ()>, id: SchemaNodeId| {
            *vertices.entry(id).or_insert_with(|| graph.add_node(id))
        };
        for leafref in &self.leafrefs {
            // Cross-boundary references leave the graph of this registry.
            let Some(target) = leafref.target else { continue };
            let from = vertex(&mut graph, leafref.owner);
            let to = vertex(&mut graph, target);
            graph.add_edge(from, to, ());
        }

        let mut cyclic: BTreeSet<String> = BTreeSet::new();
        for component in tarjan_scc(&graph) {
            let in_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&v| graph.contains_edge(v, v));
            if in_cycle {
                for v in component {
                    cyclic.insert(self.registry.path_of(graph[v]).to_string());
                }
            }
        }
        if cyclic.is_empty() {
            Ok(())
        } else {
            Err(DeploymentError::LeafrefCycle { nodes: cyclic })
        }
    }

    /// The registry this index was built for
    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Compiled constraints declared on a node, in declaration order
    pub fn constraints_of(
        &self,
        owner: SchemaNodeId,
    ) -> impl Iterator<Item = &CompiledConstraint> {
        self.by_owner
            .get(&owner)
            .into_iter()
            .flatten()
            .map(|&i| &self.constraints[i])
    }

    /// The compiled leafref declared on a node, if any
    #[must_use]
    pub fn leafref_of(&self, owner: SchemaNodeId) -> Option<&CompiledLeafref> {
        self.leafref_by_owner
            .get(&owner)
            .map(|&i| &self.leafrefs[i])
    }

    /// All compiled leafrefs
    pub fn leafrefs(&self) -> impl Iterator<Item = &CompiledLeafref> {
        self.leafrefs.iter()
    }

    /// All schema-level read edges
    pub fn edges(&self) -> impl Iterator<Item = &ImpactEdge> {
        self.edges.iter()
    }

    /// Concrete instance paths whose constraints a change can impact
    ///
    /// A change at a node also counts as a change at every instance
    /// descendant, so sources include the changed schema node's
    /// descendants. Ascend-then-descend reads bind to the changed node's
    /// neighborhood; other shapes fall back to every owner instance.
    /// Owners reading across a mount boundary are included for any
    /// change. The result is deduplicated and ordered.
    #[must_use]
    pub fn resolve_impacted(
        &self,
        tree: &InstanceTree,
        changed: &InstancePath,
        kind: ChangeKind,
    ) -> BTreeSet<InstancePath> {
        let mut impacted = BTreeSet::new();
        for &owner in &self.external_readers {
            for instance in tree.nodes_of_schema(&self.registry, owner) {
                impacted.insert(tree.path_of(instance));
            }
        }
        let Some(changed_schema) = self.changed_schema_node(tree, changed) else {
            return impacted;
        };
        trace!(path = %changed, ?kind, "resolving impacted nodes");

        for source in self.with_descendants(changed_schema) {
            for &edge in self.by_source.get(&source).into_iter().flatten() {
                let edge = &self.edges[edge];
                let anchor = edge
                    .descent
                    .and_then(|downs| self.anchor_prefix(changed, changed_schema, source, downs));
                for instance in tree.nodes_of_schema(&self.registry, edge.target) {
                    let path = tree.path_of(instance);
                    if anchor.as_ref().map_or(true, |prefix| prefix.is_prefix_of(&path)) {
                        impacted.insert(path);
                    }
                }
            }
        }
        impacted
    }

    /// The instance-path prefix every impacted owner of one edge shares
    ///
    /// An ascend-then-descend read of `downs` trailing child steps joins
    /// owner and source at the ancestor `downs` data levels above the
    /// source. When the changed node sits at or below that ancestor, the
    /// ancestor's concrete path prunes the owner instances to the ones
    /// sharing it; a change above it keeps its own path as the prefix.
    fn anchor_prefix(
        &self,
        changed: &InstancePath,
        changed_schema: SchemaNodeId,
        source: SchemaNodeId,
        downs: usize,
    ) -> Option<InstancePath> {
        let anchor_depth = self.data_depth(source).checked_sub(downs)?;
        let changed_depth = self.data_depth(changed_schema);
        if changed_depth <= anchor_depth {
            return Some(changed.clone());
        }
        let keep = changed.len().checked_sub(changed_depth - anchor_depth)?;
        Some(InstancePath::from_steps(changed.steps()[..keep].to_vec()))
    }

    /// Number of data-node ancestors, choice/case skipped; roots are 0
    fn data_depth(&self, id: SchemaNodeId) -> usize {
        let mut depth = 0;
        let mut cursor = self.registry.data_parent(id);
        while let Some(current) = cursor {
            depth += 1;
            cursor = self.registry.data_parent(current);
        }
        depth
    }

    /// Map a changed instance path to its schema node within this registry
    fn changed_schema_node(
        &self,
        tree: &InstanceTree,
        changed: &InstancePath,
    ) -> Option<SchemaNodeId> {
        if let Some(id) = tree.resolve(changed, true) {
            let (registry, schema) = tree.schema_of(id);
            if Arc::ptr_eq(registry, &self.registry) {
                return Some(schema.id);
            }
            return None;
        }
        // The subtree is already gone from the arena; fall back to the
        // schema-level path.
        self.registry.find(&changed.schema_path())
    }

    fn with_descendants(&self, id: SchemaNodeId) -> Vec<SchemaNodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.registry.node(current).children.iter().copied());
        }
        out
    }
}
