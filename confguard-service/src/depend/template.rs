//! Schema-level path templates
//!
//! Constraint expressions read other nodes through location paths. At
//! deployment time those paths are resolved against the schema tree only,
//! yielding the schema nodes an expression can ever read. The concrete
//! instance binding happens later, during impact resolution.

use crate::expression::{Axis, Expr, LocationPath, NameTest};
use confguard_core::{data_children, SchemaNodeId, SchemaRegistry};

/// One schema node read by an expression, with the path text that reads it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    /// The schema node the path resolves to
    pub node: SchemaNodeId,
    /// The path template as written in the expression
    pub template: String,
    /// Trailing child-step count for reads that only ascend then descend
    /// from the owner; anchors impact resolution to the owner's
    /// neighborhood. `None` when no instance anchor applies.
    pub descent: Option<usize>,
}

/// Outcome of a schema-level path walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathResolution {
    /// The path names a node of this registry
    Resolved(SchemaNodeId),
    /// The path leaves this registry: it climbs above the roots, descends
    /// through a mount point, or is rooted in a foreign module
    Escapes,
    /// A step names no child anywhere in reach
    Dangling,
}

/// Resolve one schema child by name test; an unprefixed test matches any
/// module
#[must_use]
pub fn child_by_test(
    registry: &SchemaRegistry,
    parent: Option<SchemaNodeId>,
    test: &NameTest,
) -> Option<SchemaNodeId> {
    data_children(registry, parent)
        .iter()
        .find(|(qname, _)| {
            qname.name == test.name
                && test.module.as_ref().map_or(true, |m| &qname.module == m)
        })
        .map(|(_, &id)| id)
}

/// Resolve a location path against the schema tree
///
/// `start` is the node owning the expression for relative paths; absolute
/// paths resolve from the registry roots. Returns `None` unless every step
/// names a schema node of this registry.
#[must_use]
pub fn resolve_schema_path(
    registry: &SchemaRegistry,
    start: Option<SchemaNodeId>,
    path: &LocationPath,
) -> Option<SchemaNodeId> {
    match trace_schema_path(registry, start, path) {
        PathResolution::Resolved(id) => Some(id),
        PathResolution::Escapes | PathResolution::Dangling => None,
    }
}

/// Walk a location path against the schema tree, distinguishing paths
/// that leave the registry from paths that name nothing at all
///
/// A path leaves the registry when it climbs above a root, steps into a
/// mount point's children, or is absolute and rooted in a foreign module.
/// Such paths can still select instances of another registry sharing the
/// tree, so they are not deployment errors.
#[must_use]
pub fn trace_schema_path(
    registry: &SchemaRegistry,
    start: Option<SchemaNodeId>,
    path: &LocationPath,
) -> PathResolution {
    let mut cursor = if path.absolute { None } else { start };
    for step in &path.steps {
        cursor = match &step.axis {
            Axis::SelfNode => cursor,
            Axis::Parent => match cursor.and_then(|id| registry.data_parent(id)) {
                Some(parent) => Some(parent),
                None => return PathResolution::Escapes,
            },
            Axis::Child(test) => match child_by_test(registry, cursor, test) {
                Some(child) => Some(child),
                None => {
                    let crosses = match cursor {
                        None => path.absolute,
                        Some(id) => registry.node(id).mount.is_some(),
                    };
                    return if crosses {
                        PathResolution::Escapes
                    } else {
                        PathResolution::Dangling
                    };
                }
            },
        };
    }
    match cursor {
        Some(id) => PathResolution::Resolved(id),
        None => PathResolution::Dangling,
    }
}

/// Collect every schema node an expression reads, predicates included
///
/// `owner` is the node the expression is declared on; `current()` binds to
/// it at the schema level. Paths that name no schema node contribute
/// nothing (they can never select an instance either). Returns true when
/// any read leaves this registry across a mount boundary; such readers
/// cannot be indexed schema-side and are re-evaluated on every change.
pub fn collect_sources(
    registry: &SchemaRegistry,
    owner: SchemaNodeId,
    expr: &Expr,
    out: &mut Vec<SourceRef>,
) -> bool {
    collect_at(registry, owner, Some(owner), expr, out)
}

fn collect_at(
    registry: &SchemaRegistry,
    owner: SchemaNodeId,
    context: Option<SchemaNodeId>,
    expr: &Expr,
    out: &mut Vec<SourceRef>,
) -> bool {
    match expr {
        Expr::Number(_) | Expr::Literal(_) => false,
        Expr::Path(path) => {
            resolve_and_collect(registry, owner, context, context == Some(owner), path, out)
        }
        Expr::PathFrom { base, steps } => {
            let mut external = collect_at(registry, owner, context, base, out);
            // current() rebinds the continuation to the owner.
            let continued = LocationPath {
                absolute: false,
                steps: steps.clone(),
            };
            external |= resolve_and_collect(registry, owner, Some(owner), true, &continued, out);
            external
        }
        Expr::Call { args, .. } => {
            let mut external = false;
            for arg in args {
                external |= collect_at(registry, owner, context, arg, out);
            }
            external
        }
        Expr::Binary { left, right, .. } => {
            let mut external = collect_at(registry, owner, context, left, out);
            external |= collect_at(registry, owner, context, right, out);
            external
        }
        Expr::Negate(inner) => collect_at(registry, owner, context, inner, out),
    }
}

/// Walk a path step by step, descending into predicates with the step's
/// node as their context; the final node is recorded as a source.
/// `anchored` marks paths whose context is the owner itself, which makes
/// the descent count meaningful for instance-level anchoring. Returns
/// true when the walk leaves the registry.
fn resolve_and_collect(
    registry: &SchemaRegistry,
    owner: SchemaNodeId,
    start: Option<SchemaNodeId>,
    anchored: bool,
    path: &LocationPath,
    out: &mut Vec<SourceRef>,
) -> bool {
    let mut external = false;
    let mut cursor = if path.absolute { None } else { start };
    for step in &path.steps {
        let next = match &step.axis {
            Axis::SelfNode => cursor,
            Axis::Parent => match cursor.and_then(|id| registry.data_parent(id)) {
                Some(parent) => Some(parent),
                // Climbed above the registry roots.
                None => return true,
            },
            Axis::Child(test) => match child_by_test(registry, cursor, test) {
                Some(child) => Some(child),
                None => {
                    let crosses = match cursor {
                        None => path.absolute,
                        Some(id) => registry.node(id).mount.is_some(),
                    };
                    return external || crosses;
                }
            },
        };
        let Some(next) = next else { return external };
        for predicate in &step.predicates {
            external |= collect_at(registry, owner, Some(next), predicate, out);
        }
        cursor = Some(next);
    }
    if let Some(node) = cursor {
        out.push(SourceRef {
            node,
            template: path.to_string(),
            descent: if anchored { descent_of(path) } else { None },
        });
    }
    external
}

/// The trailing child-step count of a relative path that only ascends
/// then descends; `None` for absolute paths and interleaved shapes
fn descent_of(path: &LocationPath) -> Option<usize> {
    if path.absolute {
        return None;
    }
    let mut downs = 0usize;
    for step in &path.steps {
        match &step.axis {
            Axis::SelfNode => {}
            Axis::Parent => {
                if downs > 0 {
                    return None;
                }
            }
            Axis::Child(_) => downs += 1,
        }
    }
    Some(downs)
}
