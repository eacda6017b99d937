//! Validation orchestrator
//!
//! Runs the phases of one change-set validation in strict order:
//! structural, expression, leafref, then mounted subtrees through their
//! nested engines. The engine itself is immutable after construction and
//! shared across concurrent validations of independent trees.

use super::context::ValidationContext;
use super::report::{self, ValidationOutcome, MUST_APP_TAG, WHEN_APP_TAG};
use super::structural;
use crate::depend::{DependencyIndex, DeploymentError};
use crate::expression::{EvalContext, Evaluator, Expr, Value};
use crate::mount::{MountCoordinator, MountResolution};
use confguard_core::{
    Change, ChangeSet, ConstraintKind, ErrorTag, InstancePath, InstancePayload, InstanceTree,
    NodeId, SchemaRegistry, StateDataProvider, ValidationSettings, Violation,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Constraint-validation engine for one schema registry
#[derive(Debug)]
pub struct ValidationEngine {
    registry: Arc<SchemaRegistry>,
    index: DependencyIndex,
    settings: ValidationSettings,
    mounts: MountCoordinator,
}

impl ValidationEngine {
    /// Build the engine, compiling every constraint expression and the
    /// dependency index
    ///
    /// # Errors
    ///
    /// Returns a [`DeploymentError`] when the registry's expressions or
    /// leafrefs do not deploy.
    pub fn new(
        registry: Arc<SchemaRegistry>,
        settings: ValidationSettings,
    ) -> Result<Self, DeploymentError> {
        let index = DependencyIndex::build(Arc::clone(&registry), &settings)?;
        Ok(Self {
            registry,
            index,
            settings,
            mounts: MountCoordinator::new(),
        })
    }

    /// The registry this engine validates against
    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// The compiled dependency index
    #[must_use]
    pub fn index(&self) -> &DependencyIndex {
        &self.index
    }

    /// Active settings
    #[must_use]
    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Validate a change-set against the tree it was applied to
    ///
    /// The tree may be mutated: choice exclusivity deletes losing case
    /// subtrees implicitly, and those deletions feed impact resolution.
    pub fn validate(
        &self,
        tree: &mut InstanceTree,
        changes: &ChangeSet,
        state: &dyn StateDataProvider,
    ) -> ValidationOutcome {
        let mut ctx = ValidationContext::new(&self.settings, state);
        let changes: Vec<Change> = changes.iter().cloned().collect();
        self.validate_scope(tree, &changes, &[None], &mut ctx);
        let mut outcome = ctx.into_outcome();
        if !outcome.valid() {
            // Defaults are only offered for injection after a clean pass.
            outcome.missing_defaults.clear();
        }
        debug!(
            violations = outcome.violation_count(),
            missing_defaults = outcome.missing_defaults.len(),
            "validation pass finished"
        );
        outcome
    }

    /// One registry scope: the whole tree for the host engine, a mounted
    /// subtree for a nested one
    pub(crate) fn validate_scope(
        &self,
        tree: &mut InstanceTree,
        changes: &[Change],
        scope_parents: &[Option<NodeId>],
        ctx: &mut ValidationContext<'_>,
    ) {
        let implicit = structural::check(tree, &self.registry, scope_parents, ctx);
        if ctx.stopped() {
            return;
        }

        let mut all_changes = changes.to_vec();
        all_changes.extend(implicit);

        self.expression_phase(tree, &all_changes, scope_parents, ctx);
        if ctx.stopped() {
            return;
        }

        // Leafrefs see the final tree, after every cascaded delete.
        self.leafref_phase(tree, ctx);
        if ctx.stopped() {
            return;
        }

        self.dispatch_mounts(tree, &all_changes, scope_parents, ctx);
    }

    /// Pre-order instance nodes typed by this engine's registry, wrapper
    /// nodes included
    fn scoped_nodes(&self, tree: &InstanceTree, scope_parents: &[Option<NodeId>]) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &parent in scope_parents {
            let mut stack: Vec<NodeId> = tree.children_or_roots(parent);
            stack.reverse();
            while let Some(id) = stack.pop() {
                let owning = tree.registry_at(tree.node(id).schema.registry);
                if !Arc::ptr_eq(owning, &self.registry) {
                    continue;
                }
                out.push(id);
                let mut children: Vec<NodeId> = tree.children(id).collect();
                children.reverse();
                stack.extend(children);
            }
        }
        out
    }

    fn expression_phase(
        &self,
        tree: &InstanceTree,
        changes: &[Change],
        scope_parents: &[Option<NodeId>],
        ctx: &mut ValidationContext<'_>,
    ) {
        let mut eval_paths: BTreeSet<InstancePath> = BTreeSet::new();
        for change in changes {
            eval_paths.extend(self.index.resolve_impacted(tree, &change.path, change.kind));
            // A touched subtree re-checks its own constraints too.
            if !change.kind.is_removal() {
                if let Some(id) = tree.resolve(&change.path, false) {
                    eval_paths.extend(tree.subtree_paths(id));
                }
            }
        }
        if eval_paths.is_empty() {
            return;
        }
        debug!(nodes = eval_paths.len(), "expression phase");

        for node in self.scoped_nodes(tree, scope_parents) {
            if matches!(
                tree.node(node).payload,
                InstancePayload::List | InstancePayload::LeafList
            ) {
                continue;
            }
            let path = tree.path_of(node);
            if !eval_paths.contains(&path) {
                continue;
            }
            self.check_constraints(tree, node, &path, ctx);
            if ctx.stopped() {
                return;
            }
        }
    }

    /// Evaluate a node's must/when constraints in declaration order
    fn check_constraints(
        &self,
        tree: &InstanceTree,
        node: NodeId,
        path: &InstancePath,
        ctx: &mut ValidationContext<'_>,
    ) {
        let schema_id = tree.node(node).schema.node;
        let evaluator = Evaluator::new(tree, Some(ctx.state()), path.clone());
        for constraint in self.index.constraints_of(schema_id) {
            let app_tag = |fallback: &str| {
                constraint
                    .error_app_tag
                    .clone()
                    .unwrap_or_else(|| fallback.to_string())
            };
            match evaluator.evaluate_boolean(&constraint.parsed, EvalContext::at(node)) {
                Ok(true) => {}
                Ok(false) => {
                    let violation = match constraint.kind {
                        ConstraintKind::Must => Violation::error(
                            path.clone(),
                            ErrorTag::OperationFailed,
                            app_tag(MUST_APP_TAG),
                            constraint.error_message.clone().unwrap_or_else(|| {
                                report::must_message(&constraint.expression)
                            }),
                        ),
                        ConstraintKind::When => Violation::error(
                            path.clone(),
                            ErrorTag::UnknownElement,
                            app_tag(WHEN_APP_TAG),
                            constraint.error_message.clone().unwrap_or_else(|| {
                                report::when_message(&constraint.expression)
                            }),
                        ),
                    };
                    ctx.report(violation);
                }
                Err(fault) => {
                    warn!(node = %path, error = %fault, "recovered evaluation fault");
                    ctx.report(Violation::error(
                        path.clone(),
                        ErrorTag::OperationFailed,
                        app_tag(MUST_APP_TAG),
                        fault.to_string(),
                    ));
                }
            }
            if ctx.stopped() {
                return;
            }
        }
    }

    /// Referential integrity for every live leafref leaf of this scope
    fn leafref_phase(&self, tree: &InstanceTree, ctx: &mut ValidationContext<'_>) {
        for leafref in self.index.leafrefs() {
            for node in tree.nodes_of_schema(&self.registry, leafref.owner) {
                let Some(value) = tree.node(node).value() else {
                    continue;
                };
                let value = value.canonical();
                let path = tree.path_of(node);
                let evaluator = Evaluator::new(tree, Some(ctx.state()), path.clone());
                let targets =
                    evaluator.evaluate(&Expr::Path(leafref.path.clone()), EvalContext::at(node));
                let found = match targets {
                    Ok(Value::NodeSet(nodes)) => {
                        nodes.iter().any(|n| evaluator.node_string(n) == value)
                    }
                    Ok(_) => false,
                    Err(fault) => {
                        warn!(node = %path, error = %fault, "recovered leafref fault");
                        false
                    }
                };
                if !found {
                    ctx.report(Violation::error(
                        path,
                        ErrorTag::DataMissing,
                        "",
                        report::leafref_message(&value),
                    ));
                    if ctx.stopped() {
                        return;
                    }
                }
            }
        }
    }

    /// Delegate mounted subtrees to their nested engines
    fn dispatch_mounts(
        &self,
        tree: &mut InstanceTree,
        changes: &[Change],
        scope_parents: &[Option<NodeId>],
        ctx: &mut ValidationContext<'_>,
    ) {
        let hosts: Vec<NodeId> = self
            .scoped_nodes(tree, scope_parents)
            .into_iter()
            .filter(|&id| tree.schema_of(id).1.mount.is_some())
            .collect();
        for host in hosts {
            match self.mounts.resolve_mount(tree, host) {
                MountResolution::NotMounted => {}
                MountResolution::UnknownDiscriminator { discriminator } => {
                    ctx.report(Violation::error(
                        tree.path_of(host),
                        ErrorTag::UnknownElement,
                        "",
                        format!("No mounted schema for '{discriminator}'."),
                    ));
                }
                MountResolution::Bound(binding) => {
                    let mounted_present = tree
                        .registries()
                        .any(|r| Arc::ptr_eq(r, &binding.registry));
                    if !mounted_present {
                        continue;
                    }
                    match self.mounts.engine_for(&binding, &self.settings) {
                        Ok(engine) => {
                            engine.validate_scope(tree, changes, &[Some(host)], ctx);
                        }
                        Err(error) => {
                            ctx.report(Violation::error(
                                binding.host_path.clone(),
                                ErrorTag::OperationFailed,
                                "",
                                error.to_string(),
                            ));
                        }
                    }
                }
            }
            if ctx.stopped() {
                return;
            }
        }
    }
}
