//! Expression evaluation over the instance tree
//!
//! The evaluator walks a parsed expression against a concrete instance
//! node. Context is threaded explicitly: `node` moves as predicates and
//! steps narrow the focus, `current` stays pinned to the node the
//! constraint is declared on.

use super::ast::{Axis, BinaryOp, Expr, LocationPath, LocationStep, NameTest};
use super::error::EvaluationError;
use super::functions;
use super::value::{number_from_str, number_to_string, NodeRef, Value};
use confguard_core::{
    InstancePath, InstanceStep, InstanceTree, NodeId, QName, Scalar, SchemaNodeKind,
    StateDataProvider, TypeDescriptor,
};

/// Evaluation context passed by value through the walk
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    /// The context node steps and predicates resolve against
    pub node: NodeId,
    /// The node `current()` returns, fixed for the whole evaluation
    pub current: NodeId,
}

impl EvalContext {
    /// Context rooted at a constraint owner; `current()` starts there too
    #[must_use]
    pub fn at(node: NodeId) -> Self {
        Self {
            node,
            current: node,
        }
    }

    fn focused(self, node: NodeId) -> Self {
        Self { node, ..self }
    }
}

/// Expression evaluator bound to one instance tree
pub struct Evaluator<'a> {
    tree: &'a InstanceTree,
    state: Option<&'a dyn StateDataProvider>,
    owner: InstancePath,
}

impl<'a> Evaluator<'a> {
    /// Evaluator for constraints owned by the node at `owner`
    #[must_use]
    pub fn new(
        tree: &'a InstanceTree,
        state: Option<&'a dyn StateDataProvider>,
        owner: InstancePath,
    ) -> Self {
        Self { tree, state, owner }
    }

    /// The instance tree being evaluated against
    #[must_use]
    pub fn tree(&self) -> &InstanceTree {
        self.tree
    }

    /// Display path of the node owning the expression, for fault messages
    #[must_use]
    pub fn owner(&self) -> String {
        self.owner.to_string()
    }

    /// Evaluate an expression to a value
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluationError`] for function faults or failed state
    /// retrieval.
    pub fn evaluate(&self, expr: &Expr, ctx: EvalContext) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Literal(s) => Ok(Value::String(s.clone())),
            Expr::Path(path) => self.eval_path(path, ctx),
            Expr::Call { function, args } => functions::invoke(self, ctx, *function, args),
            Expr::PathFrom { base, steps } => {
                let base = self.evaluate(base, ctx)?;
                let Value::NodeSet(nodes) = base else {
                    return Ok(Value::empty());
                };
                let mut out = Vec::new();
                for node in nodes {
                    if let NodeRef::Tree(id) = node {
                        let narrowed = self.walk_steps(vec![NodeRef::Tree(id)], steps, ctx)?;
                        out.extend(narrowed);
                    }
                }
                Ok(Value::NodeSet(out))
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, ctx),
            Expr::Negate(inner) => {
                let value = self.evaluate(inner, ctx)?;
                Ok(Value::Number(-self.to_number(&value)))
            }
        }
    }

    /// Evaluate an expression and coerce the result to a boolean
    ///
    /// # Errors
    ///
    /// Propagates evaluation faults.
    pub fn evaluate_boolean(&self, expr: &Expr, ctx: EvalContext) -> Result<bool, EvaluationError> {
        Ok(self.evaluate(expr, ctx)?.boolean())
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        ctx: EvalContext,
    ) -> Result<Value, EvaluationError> {
        match op {
            BinaryOp::Or => {
                // Short-circuit, faults in the skipped operand do not fire.
                if self.evaluate_boolean(left, ctx)? {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(self.evaluate_boolean(right, ctx)?))
            }
            BinaryOp::And => {
                if !self.evaluate_boolean(left, ctx)? {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(self.evaluate_boolean(right, ctx)?))
            }
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq
            | BinaryOp::GtEq => {
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                Ok(Value::Boolean(self.compare(op, &l, &r)))
            }
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Div
            | BinaryOp::Mod => {
                let l = self.to_number(&self.evaluate(left, ctx)?);
                let r = self.to_number(&self.evaluate(right, ctx)?);
                let n = match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Subtract => l - r,
                    BinaryOp::Multiply => l * r,
                    BinaryOp::Div => l / r,
                    _ => l % r,
                };
                Ok(Value::Number(n))
            }
        }
    }

    /// XPath comparison with existential node-set semantics
    fn compare(&self, op: BinaryOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            // Against a boolean the whole set coerces, empty included.
            (Value::NodeSet(_), Value::Boolean(b)) => {
                self.compare_plain(op, &Value::Boolean(left.boolean()), &Value::Boolean(*b))
            }
            (Value::Boolean(b), Value::NodeSet(_)) => {
                self.compare_plain(op, &Value::Boolean(*b), &Value::Boolean(right.boolean()))
            }
            (Value::NodeSet(l), Value::NodeSet(r)) => l.iter().any(|ln| {
                let ls = self.node_string(ln);
                r.iter()
                    .any(|rn| self.compare_scalars(op, &ls, &self.node_string(rn)))
            }),
            (Value::NodeSet(nodes), other) => nodes
                .iter()
                .any(|n| self.compare_node_to(op, n, other)),
            (other, Value::NodeSet(nodes)) => nodes
                .iter()
                .any(|n| self.compare_node_to(Self::flip(op), n, other)),
            (l, r) => self.compare_plain(op, l, r),
        }
    }

    fn flip(op: BinaryOp) -> BinaryOp {
        match op {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            BinaryOp::GtEq => BinaryOp::LtEq,
            other => other,
        }
    }

    fn compare_node_to(&self, op: BinaryOp, node: &NodeRef, other: &Value) -> bool {
        match other {
            Value::Boolean(b) => {
                self.compare_plain(op, &Value::Boolean(true), &Value::Boolean(*b))
            }
            Value::Number(n) => self.compare_numbers(op, number_from_str(&self.node_string(node)), *n),
            Value::String(s) => self.compare_scalars(op, &self.node_string(node), s),
            Value::NodeSet(_) => false,
        }
    }

    fn compare_plain(&self, op: BinaryOp, left: &Value, right: &Value) -> bool {
        match op {
            BinaryOp::Eq | BinaryOp::NotEq => {
                let equal = match (left, right) {
                    (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
                        left.boolean() == right.boolean()
                    }
                    (Value::Number(_), _) | (_, Value::Number(_)) => {
                        self.to_number(left) == self.to_number(right)
                    }
                    _ => self.to_string(left) == self.to_string(right),
                };
                if op == BinaryOp::Eq {
                    equal
                } else {
                    !equal
                }
            }
            _ => self.compare_numbers(op, self.to_number(left), self.to_number(right)),
        }
    }

    fn compare_scalars(&self, op: BinaryOp, left: &str, right: &str) -> bool {
        match op {
            BinaryOp::Eq => left == right,
            BinaryOp::NotEq => left != right,
            _ => self.compare_numbers(op, number_from_str(left), number_from_str(right)),
        }
    }

    #[allow(clippy::unused_self)]
    fn compare_numbers(&self, op: BinaryOp, l: f64, r: f64) -> bool {
        match op {
            BinaryOp::Eq => l == r,
            BinaryOp::NotEq => l != r,
            BinaryOp::Lt => l < r,
            BinaryOp::Gt => l > r,
            BinaryOp::LtEq => l <= r,
            BinaryOp::GtEq => l >= r,
            _ => false,
        }
    }

    /// XPath string value of a node; non-leaf nodes render as empty
    pub(crate) fn node_string(&self, node: &NodeRef) -> String {
        match node {
            NodeRef::Tree(id) => self
                .tree
                .node(*id)
                .value()
                .map(Scalar::canonical)
                .unwrap_or_default(),
            NodeRef::State { value, .. } => value.canonical(),
        }
    }

    /// The scalar carried by a node, if it is a leaf kind
    pub(crate) fn node_scalar(&self, node: &NodeRef) -> Option<Scalar> {
        match node {
            NodeRef::Tree(id) => self.tree.node(*id).value().cloned(),
            NodeRef::State { value, .. } => Some(value.clone()),
        }
    }

    /// Qualified name of a node
    pub(crate) fn node_qname(&self, node: &NodeRef) -> Option<QName> {
        match node {
            NodeRef::Tree(id) => Some(self.tree.node(*id).qname.clone()),
            NodeRef::State { path, .. } => path.steps().last().map(|s| s.qname.clone()),
        }
    }

    /// Enumeration ordinal of a node's value, per its schema type
    pub(crate) fn node_enum_ordinal(&self, node: &NodeRef) -> Option<i64> {
        let NodeRef::Tree(id) = node else {
            return None;
        };
        let (_, schema) = self.tree.schema_of(*id);
        let TypeDescriptor::Enumeration { values } = schema.type_descriptor()? else {
            return None;
        };
        let label = self.node_string(node);
        values
            .iter()
            .find(|(l, _)| *l == label)
            .map(|&(_, ordinal)| ordinal)
    }

    /// Identity-hierarchy check on a node's identityref value
    pub(crate) fn node_derived_from(&self, node: &NodeRef, base: &QName, or_self: bool) -> bool {
        let NodeRef::Tree(id) = node else {
            return false;
        };
        let Some(Scalar::Identity(identity)) = self.node_scalar(node) else {
            return false;
        };
        let (registry, _) = self.tree.schema_of(*id);
        if or_self {
            registry.identities().is_derived_from_or_self(&identity, base)
        } else {
            registry.identities().is_derived_from(&identity, base)
        }
    }

    /// Coerce a value to a number; a node-set converts via its first node
    pub(crate) fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => number_from_str(s),
            Value::NodeSet(nodes) => match nodes.first() {
                Some(node) => number_from_str(&self.node_string(node)),
                None => f64::NAN,
            },
        }
    }

    /// Coerce a value to a string; a node-set converts via its first node
    pub(crate) fn to_string(&self, value: &Value) -> String {
        match value {
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::NodeSet(nodes) => nodes
                .first()
                .map(|n| self.node_string(n))
                .unwrap_or_default(),
        }
    }

    fn eval_path(&self, path: &LocationPath, ctx: EvalContext) -> Result<Value, EvaluationError> {
        let start = if path.absolute {
            self.tree.roots().map(NodeRef::Tree).collect()
        } else {
            vec![NodeRef::Tree(ctx.node)]
        };
        let nodes = if path.absolute {
            // Absolute steps select among the roots themselves first.
            self.walk_absolute(start, &path.steps, ctx)?
        } else {
            self.walk_steps(start, &path.steps, ctx)?
        };
        Ok(Value::NodeSet(nodes))
    }

    /// The first absolute step names a root; later steps descend normally
    fn walk_absolute(
        &self,
        roots: Vec<NodeRef>,
        steps: &[LocationStep],
        ctx: EvalContext,
    ) -> Result<Vec<NodeRef>, EvaluationError> {
        let Some((first, rest)) = steps.split_first() else {
            return Ok(roots);
        };
        let mut selected = Vec::new();
        match &first.axis {
            Axis::Child(test) => {
                for root in roots {
                    if let NodeRef::Tree(id) = root {
                        if self.matches_test(id, test) {
                            selected.push(NodeRef::Tree(id));
                        }
                    }
                }
            }
            Axis::SelfNode | Axis::Parent => {}
        }
        let selected = self.apply_predicates(selected, &first.predicates, ctx)?;
        self.walk_steps(selected, rest, ctx)
    }

    fn walk_steps(
        &self,
        start: Vec<NodeRef>,
        steps: &[LocationStep],
        ctx: EvalContext,
    ) -> Result<Vec<NodeRef>, EvaluationError> {
        let mut set = start;
        for step in steps {
            let mut next = Vec::new();
            for node in &set {
                match &step.axis {
                    Axis::SelfNode => next.push(node.clone()),
                    Axis::Parent => {
                        if let NodeRef::Tree(id) = node {
                            if let Some(parent) = self.data_parent(*id) {
                                next.push(NodeRef::Tree(parent));
                            }
                        }
                    }
                    Axis::Child(test) => {
                        if let NodeRef::Tree(id) = node {
                            self.child_step(*id, test, &mut next)?;
                        }
                    }
                }
            }
            // Parent steps over sibling entries converge on one node.
            next.dedup();
            set = self.apply_predicates(next, &step.predicates, ctx)?;
        }
        Ok(set)
    }

    /// Parent in path terms, skipping list and leaf-list wrapper nodes
    fn data_parent(&self, id: NodeId) -> Option<NodeId> {
        use confguard_core::InstancePayload;
        let mut cursor = self.tree.node(id).parent;
        while let Some(parent) = cursor {
            match self.tree.node(parent).payload {
                InstancePayload::List | InstancePayload::LeafList => {
                    cursor = self.tree.node(parent).parent;
                }
                _ => return Some(parent),
            }
        }
        None
    }

    fn matches_test(&self, id: NodeId, test: &NameTest) -> bool {
        let qname = &self.tree.node(id).qname;
        if qname.name != test.name {
            return false;
        }
        match &test.module {
            Some(module) => &qname.module == module,
            None => true,
        }
    }

    /// Children matching a name test; wrapper nodes expand to their entries
    fn child_step(
        &self,
        id: NodeId,
        test: &NameTest,
        out: &mut Vec<NodeRef>,
    ) -> Result<(), EvaluationError> {
        use confguard_core::InstancePayload;
        let mut found = false;
        for child in self.tree.children(id) {
            if !self.matches_test(child, test) {
                continue;
            }
            found = true;
            match self.tree.node(child).payload {
                InstancePayload::List | InstancePayload::LeafList => {
                    out.extend(self.tree.children(child).map(NodeRef::Tree));
                }
                _ => out.push(NodeRef::Tree(child)),
            }
        }
        if !found {
            self.fetch_state_child(id, test, out)?;
        }
        Ok(())
    }

    /// A state leaf absent from the tree is fetched through the provider
    fn fetch_state_child(
        &self,
        id: NodeId,
        test: &NameTest,
        out: &mut Vec<NodeRef>,
    ) -> Result<(), EvaluationError> {
        let Some(provider) = self.state else {
            return Ok(());
        };
        let (registry, schema) = self.tree.schema_of(id);
        let qname = QName::new(
            test.module
                .clone()
                .unwrap_or_else(|| self.tree.node(id).qname.module.clone()),
            test.name.clone(),
        );
        let Some(child) = registry.child_by_qname(Some(schema.id), &qname) else {
            return Ok(());
        };
        let child_node = registry.node(child);
        if child_node.config || !matches!(child_node.kind, SchemaNodeKind::Leaf { .. }) {
            return Ok(());
        }
        let path = self.tree.path_of(id).child(InstanceStep::new(qname));
        let fetched = provider
            .retrieve_state(std::slice::from_ref(&path))
            .map_err(|e| EvaluationError::StateRetrieval {
                reason: e.to_string(),
            })?;
        if let Some(value) = fetched.get(&path) {
            out.push(NodeRef::State {
                path,
                value: value.clone(),
            });
        }
        Ok(())
    }

    fn apply_predicates(
        &self,
        nodes: Vec<NodeRef>,
        predicates: &[Expr],
        ctx: EvalContext,
    ) -> Result<Vec<NodeRef>, EvaluationError> {
        if predicates.is_empty() {
            return Ok(nodes);
        }
        let mut kept = Vec::new();
        'candidates: for node in nodes {
            for predicate in predicates {
                let focus = match &node {
                    NodeRef::Tree(id) => ctx.focused(*id),
                    NodeRef::State { .. } => continue 'candidates,
                };
                if !self.evaluate_boolean(predicate, focus)? {
                    continue 'candidates;
                }
            }
            kept.push(node);
        }
        Ok(kept)
    }
}
