//! Structural validation phase
//!
//! Mandatory presence, list and leaf-list cardinality, duplicate singleton
//! detection, choice/case exclusivity, pattern and enumeration and union
//! type checks. Choice exclusivity is the only check that mutates the
//! tree: losing case subtrees are implicitly deleted and the deletions are
//! handed back so the expression phase can resolve their impact.

use super::context::ValidationContext;
use super::report;
use crate::expression::functions::compile_anchored;
use confguard_core::{
    data_children, Change, ChangeKind, ErrorTag, InstancePath, InstancePayload, InstanceStep,
    InstanceTree, NodeId, Scalar, SchemaNodeId, SchemaNodeKind, SchemaRegistry, TypeDescriptor,
    Violation,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Run the structural phase over one registry's scope
///
/// `scope_parents` are the instance parents whose subtrees this registry
/// types: `[None]` for the host registry, the mount-point containers for a
/// mounted one. Returns the implicit deletions performed for choice
/// exclusivity.
pub fn check(
    tree: &mut InstanceTree,
    registry: &Arc<SchemaRegistry>,
    scope_parents: &[Option<NodeId>],
    ctx: &mut ValidationContext<'_>,
) -> Vec<Change> {
    let mut implicit = Vec::new();
    for &parent in scope_parents {
        enforce_choice_exclusivity(tree, registry, parent, &mut implicit);
    }
    if !implicit.is_empty() {
        debug!(count = implicit.len(), "implicit case deletions");
    }
    for &parent in scope_parents {
        check_subtree(tree, registry, parent, ctx);
        if ctx.stopped() {
            break;
        }
    }
    implicit
}

/// Schema context of an instance parent within this registry
///
/// A mount-point container belongs to the host registry; its mounted
/// children resolve against the mounted registry's roots (`None`).
fn schema_parent(
    tree: &InstanceTree,
    registry: &Arc<SchemaRegistry>,
    parent: Option<NodeId>,
) -> Option<SchemaNodeId> {
    let id = parent?;
    let (owning, schema) = tree.schema_of(id);
    if Arc::ptr_eq(owning, registry) {
        Some(schema.id)
    } else {
        None
    }
}

fn in_scope(tree: &InstanceTree, registry: &Arc<SchemaRegistry>, id: NodeId) -> bool {
    Arc::ptr_eq(tree.registry_at(tree.node(id).schema.registry), registry)
}

fn parent_path(tree: &InstanceTree, parent: Option<NodeId>) -> InstancePath {
    parent.map_or_else(InstancePath::root, |id| tree.path_of(id))
}

/// Delete losing case subtrees wherever children of two cases of one
/// choice coexist; the newest arena node decides the winning case
fn enforce_choice_exclusivity(
    tree: &mut InstanceTree,
    registry: &Arc<SchemaRegistry>,
    parent: Option<NodeId>,
    implicit: &mut Vec<Change>,
) {
    let children = tree.children_or_roots(parent);
    let scoped: Vec<NodeId> = children
        .iter()
        .copied()
        .filter(|&c| in_scope(tree, registry, c))
        .collect();

    // choice -> (winning case, members per case)
    let mut by_choice: HashMap<SchemaNodeId, Vec<(SchemaNodeId, NodeId)>> = HashMap::new();
    for &child in &scoped {
        let schema_id = tree.node(child).schema.node;
        if let Some((choice, case)) = registry.case_of(schema_id) {
            by_choice.entry(choice).or_default().push((case, child));
        }
    }

    for (_, members) in by_choice {
        let cases: std::collections::BTreeSet<SchemaNodeId> =
            members.iter().map(|&(case, _)| case).collect();
        if cases.len() < 2 {
            continue;
        }
        let winner = members
            .iter()
            .max_by_key(|&&(_, node)| node)
            .map(|&(case, _)| case);
        for &(case, node) in &members {
            if Some(case) == winner {
                continue;
            }
            for path in tree.subtree_paths(node) {
                implicit.push(Change::new(path, ChangeKind::Delete));
            }
            tree.delete(node);
        }
    }

    for child in children {
        if !tree.node(child).deleted {
            enforce_choice_exclusivity(tree, registry, Some(child), implicit);
        }
    }
}

fn check_subtree(
    tree: &InstanceTree,
    registry: &Arc<SchemaRegistry>,
    parent: Option<NodeId>,
    ctx: &mut ValidationContext<'_>,
) {
    check_parent(tree, registry, parent, ctx);
    if ctx.stopped() {
        return;
    }
    for child in tree.children_or_roots(parent) {
        if !in_scope(tree, registry, child) {
            continue;
        }
        check_node(tree, registry, child, ctx);
        if ctx.stopped() {
            return;
        }
        check_subtree(tree, registry, Some(child), ctx);
        if ctx.stopped() {
            return;
        }
    }
}

/// Schema-side checks against one instance parent: mandatory presence,
/// cardinality, duplicate singletons
fn check_parent(
    tree: &InstanceTree,
    registry: &Arc<SchemaRegistry>,
    parent: Option<NodeId>,
    ctx: &mut ValidationContext<'_>,
) {
    // A list or leaf-list wrapper shares its entries' schema ref but holds
    // entry nodes, not data children; the entries are the instance parents
    // the list schema's children are checked against.
    if let Some(id) = parent {
        if matches!(
            tree.node(id).payload,
            InstancePayload::List | InstancePayload::LeafList
        ) {
            return;
        }
    }
    let schema_ctx = schema_parent(tree, registry, parent);
    if parent.is_some() && schema_ctx.is_none() && !is_mount_parent(tree, registry, parent) {
        return;
    }
    // List entries have the same checks as containers; leaves have none.
    if let Some(sp) = schema_ctx {
        if !matches!(
            registry.node(sp).kind,
            SchemaNodeKind::Container { .. } | SchemaNodeKind::List { .. }
        ) {
            return;
        }
    }

    let base = parent_path(tree, parent);
    for (qname, child_id) in data_children(registry, schema_ctx) {
        let child_schema = registry.node(child_id);
        let instances: Vec<NodeId> = tree
            .children_by_qname(parent, &qname)
            .filter(|&c| in_scope(tree, registry, c))
            .collect();

        match &child_schema.kind {
            SchemaNodeKind::Leaf { mandatory, default, .. } => {
                if instances.is_empty() {
                    if *mandatory {
                        ctx.report(Violation::error(
                            base.child(InstanceStep::new(qname.clone())),
                            ErrorTag::MissingElement,
                            "",
                            report::mandatory_message(&qname),
                        ));
                    } else if default.is_some() {
                        ctx.note_missing_default(base.child(InstanceStep::new(qname.clone())));
                    }
                } else if instances.len() > 1 {
                    ctx.report(Violation::error(
                        base.clone(),
                        ErrorTag::DuplicateElement,
                        "",
                        report::duplicate_message(&qname),
                    ));
                }
            }
            SchemaNodeKind::Container { .. } => {
                if instances.len() > 1 {
                    ctx.report(Violation::error(
                        base.clone(),
                        ErrorTag::DuplicateElement,
                        "",
                        report::duplicate_message(&qname),
                    ));
                }
            }
            SchemaNodeKind::List { min_elements, max_elements, .. }
            | SchemaNodeKind::LeafList { min_elements, max_elements, .. } => {
                let count = instances
                    .first()
                    .map_or(0, |&wrapper| tree.children(wrapper).count() as u32);
                let list_path = base.child(InstanceStep::new(qname.clone()));
                if let Some(min) = min_elements {
                    if count < *min {
                        ctx.report(Violation::error(
                            list_path.clone(),
                            ErrorTag::TooFewElements,
                            "",
                            report::min_elements_message(*min, &qname),
                        ));
                    }
                }
                if let Some(max) = max_elements {
                    if count > *max {
                        ctx.report(Violation::error(
                            list_path,
                            ErrorTag::TooManyElements,
                            "",
                            report::max_elements_message(*max, &qname),
                        ));
                    }
                }
            }
            _ => {}
        }
        if ctx.stopped() {
            return;
        }
    }

    check_mandatory_choices(tree, registry, parent, schema_ctx, &base, ctx);
}

/// True when `parent` is a mount-point container this registry is mounted
/// under; its children then resolve against this registry's roots
fn is_mount_parent(
    tree: &InstanceTree,
    registry: &Arc<SchemaRegistry>,
    parent: Option<NodeId>,
) -> bool {
    let Some(id) = parent else { return false };
    let (_, schema) = tree.schema_of(id);
    schema.mount.is_some()
        && tree
            .children(id)
            .any(|c| in_scope(tree, registry, c))
}

fn check_mandatory_choices(
    tree: &InstanceTree,
    registry: &Arc<SchemaRegistry>,
    parent: Option<NodeId>,
    schema_ctx: Option<SchemaNodeId>,
    base: &InstancePath,
    ctx: &mut ValidationContext<'_>,
) {
    let children: &[SchemaNodeId] = match schema_ctx {
        Some(id) => &registry.node(id).children,
        None => registry.roots(),
    };
    for &child_id in children {
        let node = registry.node(child_id);
        let SchemaNodeKind::Choice { mandatory: true } = node.kind else {
            continue;
        };
        let selected = tree.children_or_roots(parent).into_iter().any(|c| {
            in_scope(tree, registry, c)
                && registry
                    .case_of(tree.node(c).schema.node)
                    .is_some_and(|(choice, _)| choice == child_id)
        });
        if !selected {
            ctx.report(Violation::error(
                base.clone(),
                ErrorTag::MissingElement,
                "",
                report::mandatory_message(&node.qname),
            ));
            if ctx.stopped() {
                return;
            }
        }
    }
}

/// Value checks on one leaf or leaf-list entry
fn check_node(
    tree: &InstanceTree,
    registry: &Arc<SchemaRegistry>,
    id: NodeId,
    ctx: &mut ValidationContext<'_>,
) {
    let node = tree.node(id);
    let Some(value) = node.value() else { return };
    let (_, schema) = tree.schema_of(id);
    let Some(descriptor) = schema.type_descriptor() else {
        return;
    };
    match descriptor {
        TypeDescriptor::String { patterns } if !patterns.is_empty() => {
            if let Err(message) = match_patterns(value, patterns) {
                ctx.report(Violation::error(
                    tree.path_of(id),
                    ErrorTag::InvalidValue,
                    "",
                    message,
                ));
            }
        }
        TypeDescriptor::Enumeration { values } => {
            let label = value.canonical();
            if !values.iter().any(|(l, _)| *l == label) {
                ctx.report(Violation::error(
                    tree.path_of(id),
                    ErrorTag::InvalidValue,
                    "",
                    format!("Invalid enumeration value '{label}'."),
                ));
            }
        }
        TypeDescriptor::Union { members } => {
            let mut failures = Vec::new();
            let matched = members
                .iter()
                .any(|member| match member_matches(registry, value, member) {
                    Ok(()) => true,
                    Err(failure) => {
                        failures.push(failure);
                        false
                    }
                });
            if !matched {
                ctx.report(Violation::error(
                    tree.path_of(id),
                    ErrorTag::InvalidValue,
                    "",
                    report::union_message(&failures),
                ));
            }
        }
        _ => {}
    }
}

fn match_patterns(value: &Scalar, patterns: &[String]) -> Result<(), String> {
    let text = value.canonical();
    for pattern in patterns {
        let regex = compile_anchored(pattern)
            .map_err(|_| format!("Pattern '{pattern}' is not a valid regular expression."))?;
        if !regex.is_match(&text) {
            return Err(format!("String '{text}' does not match pattern '{pattern}'."));
        }
    }
    Ok(())
}

/// One union member's acceptance test; the failure text feeds the
/// " or "-joined union message
fn member_matches(
    registry: &Arc<SchemaRegistry>,
    value: &Scalar,
    member: &TypeDescriptor,
) -> Result<(), String> {
    let text = value.canonical();
    match member {
        TypeDescriptor::String { patterns } => match_patterns(value, patterns),
        TypeDescriptor::Int => text
            .parse::<i64>()
            .map(|_| ())
            .map_err(|_| format!("'{text}' is not a valid int64")),
        TypeDescriptor::Uint => text
            .parse::<u64>()
            .map(|_| ())
            .map_err(|_| format!("'{text}' is not a valid uint64")),
        TypeDescriptor::Decimal => text
            .parse::<f64>()
            .map(|_| ())
            .map_err(|_| format!("'{text}' is not a valid decimal64")),
        TypeDescriptor::Boolean => {
            if text == "true" || text == "false" {
                Ok(())
            } else {
                Err(format!("'{text}' is not a valid boolean"))
            }
        }
        TypeDescriptor::Empty => {
            if text.is_empty() {
                Ok(())
            } else {
                Err(format!("'{text}' is not a valid empty value"))
            }
        }
        TypeDescriptor::Enumeration { values } => {
            if values.iter().any(|(l, _)| *l == text) {
                Ok(())
            } else {
                Err(format!("'{text}' is not a valid enumeration value"))
            }
        }
        TypeDescriptor::Bits { bits } => match value {
            Scalar::Bits(set) if set.iter().all(|b| bits.contains(b)) => Ok(()),
            _ => Err(format!("'{text}' is not a valid bits value")),
        },
        TypeDescriptor::IdentityRef { base } => match value {
            Scalar::Identity(identity)
                if registry.identities().is_derived_from_or_self(identity, base) =>
            {
                Ok(())
            }
            _ => Err(format!("'{text}' is not derived from {base}")),
        },
        // Referential integrity of leafref members is the leafref phase's
        // concern.
        TypeDescriptor::Leafref { .. } => Ok(()),
        TypeDescriptor::Union { members } => {
            let mut failures = Vec::new();
            for inner in members {
                match member_matches(registry, value, inner) {
                    Ok(()) => return Ok(()),
                    Err(failure) => failures.push(failure),
                }
            }
            Err(report::union_message(&failures))
        }
    }
}
