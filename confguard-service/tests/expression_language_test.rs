//! End-to-end tests for the expression language: parsing plus evaluation
//! against a concrete instance tree.

use confguard_core::{
    InstancePath, InstanceTree, ModelError, QName, Scalar, SchemaBuilder, StateDataProvider,
    TypeDescriptor,
};
use confguard_service::expression::{EvalContext, Evaluator, Parser, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A module with a keyed list, enumeration and identityref leaves, and a
/// state counter
fn build_registry() -> Arc<confguard_core::SchemaRegistry> {
    let mut b = SchemaBuilder::new("net");
    let system = b.container(None, "net", "system").expect("system");
    let iface = b.list(Some(system), "net", "interface", &["name"]).expect("interface");
    b.leaf(Some(iface), "net", "name", TypeDescriptor::string()).expect("name");
    b.leaf(Some(iface), "net", "mtu", TypeDescriptor::Uint).expect("mtu");
    b.leaf(
        Some(iface),
        "net",
        "speed",
        TypeDescriptor::Enumeration {
            values: vec![("ten".to_string(), 10), ("hundred".to_string(), 100)],
        },
    )
    .expect("speed");
    b.leaf(
        Some(iface),
        "net",
        "kind",
        TypeDescriptor::IdentityRef {
            base: QName::new("net", "interface-type"),
        },
    )
    .expect("kind");
    b.leaf(
        Some(iface),
        "net",
        "flags",
        TypeDescriptor::Bits {
            bits: vec!["up".to_string(), "loopback".to_string()],
        },
    )
    .expect("flags");
    let counter = b
        .leaf(Some(system), "net", "error-count", TypeDescriptor::Uint)
        .expect("error-count");
    b.state(counter);
    b.leaf_list(Some(system), "net", "dns", TypeDescriptor::string()).expect("dns");

    b.identity(QName::new("net", "interface-type"), None);
    b.identity(
        QName::new("net", "ethernet"),
        Some(QName::new("net", "interface-type")),
    );
    b.identity(
        QName::new("net", "fast-ethernet"),
        Some(QName::new("net", "ethernet")),
    );
    b.build()
}

fn build_tree(registry: &Arc<confguard_core::SchemaRegistry>) -> InstanceTree {
    let mut tree = InstanceTree::new(Arc::clone(registry));
    let system = tree.add_container(None, "net", "system").expect("system");
    let eth0 = tree
        .add_list_entry(
            Some(system),
            "net",
            "interface",
            &[("name", Scalar::String("eth0".to_string()))],
        )
        .expect("eth0");
    tree.set_leaf(Some(eth0), "net", "mtu", Scalar::Uint(1500)).expect("mtu");
    tree.set_leaf(
        Some(eth0),
        "net",
        "speed",
        Scalar::Enum("hundred".to_string()),
    )
    .expect("speed");
    tree.set_leaf(
        Some(eth0),
        "net",
        "kind",
        Scalar::Identity(QName::new("net", "fast-ethernet")),
    )
    .expect("kind");
    tree.set_leaf(
        Some(eth0),
        "net",
        "flags",
        Scalar::Bits(vec!["up".to_string()]),
    )
    .expect("flags");
    let eth1 = tree
        .add_list_entry(
            Some(system),
            "net",
            "interface",
            &[("name", Scalar::String("eth1".to_string()))],
        )
        .expect("eth1");
    tree.set_leaf(Some(eth1), "net", "mtu", Scalar::Uint(9000)).expect("mtu");
    tree.add_leaf_list_value(Some(system), "net", "dns", Scalar::String("10.0.0.1".to_string()))
        .expect("dns");
    tree.add_leaf_list_value(Some(system), "net", "dns", Scalar::String("10.0.0.2".to_string()))
        .expect("dns");
    tree
}

fn eval_at(tree: &InstanceTree, node: confguard_core::NodeId, text: &str) -> Value {
    let parser = Parser::new();
    let expr = parser.parse(text).expect("parse");
    let evaluator = Evaluator::new(tree, None, tree.path_of(node));
    evaluator
        .evaluate(&expr, EvalContext::at(node))
        .expect("evaluate")
}

fn mtu_of(tree: &InstanceTree, name: &str) -> confguard_core::NodeId {
    let system = tree
        .child_by_qname(None, &QName::new("net", "system"))
        .expect("system");
    let wrapper = tree
        .child_by_qname(Some(system), &QName::new("net", "interface"))
        .expect("wrapper");
    let entry = tree
        .list_entry(wrapper, &[("name".to_string(), name.to_string())])
        .expect("entry");
    tree.child_by_qname(Some(entry), &QName::new("net", "mtu"))
        .expect("mtu")
}

#[test]
fn test_arithmetic_and_comparison() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    assert_eq!(eval_at(&tree, mtu, "1 + 2 * 3"), Value::Number(7.0));
    assert_eq!(eval_at(&tree, mtu, "7 mod 3"), Value::Number(1.0));
    assert_eq!(eval_at(&tree, mtu, ". = 1500"), Value::Boolean(true));
    assert_eq!(eval_at(&tree, mtu, ". < 1000"), Value::Boolean(false));
    assert_eq!(eval_at(&tree, mtu, "-. + 1501"), Value::Number(1.0));
}

#[test]
fn test_rounding_functions() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    assert_eq!(eval_at(&tree, mtu, "round(2.5)"), Value::Number(3.0));
    assert_eq!(eval_at(&tree, mtu, "round(2.4)"), Value::Number(2.0));
    assert_eq!(eval_at(&tree, mtu, "floor(2.9)"), Value::Number(2.0));
    assert_eq!(eval_at(&tree, mtu, "ceiling(2.1)"), Value::Number(3.0));
}

#[test]
fn test_string_functions() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    assert_eq!(
        eval_at(&tree, mtu, "concat('a', 'b', 'c')"),
        Value::String("abc".to_string())
    );
    assert_eq!(
        eval_at(&tree, mtu, "contains(../name, 'th')"),
        Value::Boolean(true)
    );
    assert_eq!(
        eval_at(&tree, mtu, "string-length(../name)"),
        Value::Number(4.0)
    );
    assert_eq!(
        eval_at(&tree, mtu, "substring-before('10.0.0.1', '.')"),
        Value::String("10".to_string())
    );
    assert_eq!(
        eval_at(&tree, mtu, "local-name(..)"),
        Value::String("interface".to_string())
    );
    assert_eq!(
        eval_at(&tree, mtu, "namespace-uri(.)"),
        Value::String("net".to_string())
    );
}

#[test]
fn test_navigation_with_key_predicate_and_current() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    // Sibling entry addressed by key literal.
    assert_eq!(
        eval_at(&tree, mtu, "../../interface[name = 'eth1']/mtu = 9000"),
        Value::Boolean(true)
    );
    // current() pins the entry the expression started on.
    assert_eq!(
        eval_at(
            &tree,
            mtu,
            "../../interface[name = current()/../name]/mtu = 1500"
        ),
        Value::Boolean(true)
    );
}

#[test]
fn test_count_over_keyed_list_and_leaf_list() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    assert_eq!(eval_at(&tree, mtu, "count(../../interface)"), Value::Number(2.0));
    assert_eq!(eval_at(&tree, mtu, "count(../../dns)"), Value::Number(2.0));
    assert_eq!(
        eval_at(&tree, mtu, "count(../../interface[mtu > 2000])"),
        Value::Number(1.0)
    );
}

#[test]
fn test_navigation_to_absent_node_is_empty_node_set() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    assert_eq!(eval_at(&tree, mtu, "../missing"), Value::NodeSet(Vec::new()));
    assert_eq!(eval_at(&tree, mtu, "boolean(../missing)"), Value::Boolean(false));
    assert_eq!(eval_at(&tree, mtu, "../missing = 'x'"), Value::Boolean(false));
}

#[test]
fn test_derived_from_walks_identity_hierarchy() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    assert_eq!(
        eval_at(&tree, mtu, "derived-from(../kind, 'net:ethernet')"),
        Value::Boolean(true)
    );
    // Strict derivation excludes the identity itself.
    assert_eq!(
        eval_at(&tree, mtu, "derived-from(../kind, 'net:fast-ethernet')"),
        Value::Boolean(false)
    );
    assert_eq!(
        eval_at(&tree, mtu, "derived-from-or-self(../kind, 'net:fast-ethernet')"),
        Value::Boolean(true)
    );
}

#[test]
fn test_enum_value_returns_declared_ordinal() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    assert_eq!(eval_at(&tree, mtu, "enum-value(../speed)"), Value::Number(100.0));
    assert_eq!(
        eval_at(&tree, mtu, "enum-value(../speed) >= 100"),
        Value::Boolean(true)
    );
    // Absent optional node selects nothing and compares to nothing.
    let Value::Number(n) = eval_at(&tree, mtu, "enum-value(../missing)") else {
        panic!("expected a number");
    };
    assert!(n.is_nan());
}

#[test]
fn test_enum_value_without_arguments_faults() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    let parser = Parser::new();
    let expr = parser.parse("enum-value()").expect("parse");
    let evaluator = Evaluator::new(&tree, None, tree.path_of(mtu));
    let error = evaluator
        .evaluate(&expr, EvalContext::at(mtu))
        .expect_err("missing argument");
    let message = error.to_string();
    assert!(message.contains("Missing argument(s) in enum-value function"));
    assert!(message.contains("net:mtu"));
}

#[test]
fn test_re_match_requires_all_selected_values_to_match() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    assert_eq!(
        eval_at(&tree, mtu, r"re-match(../../dns, '10\.0\.0\.\d+')"),
        Value::Boolean(true)
    );
    // One non-matching sibling fails the whole set.
    assert_eq!(
        eval_at(&tree, mtu, r"re-match(../../interface/name, 'eth0')"),
        Value::Boolean(false)
    );
    // An empty selection matches vacuously.
    assert_eq!(
        eval_at(&tree, mtu, r"re-match(../missing, 'x+')"),
        Value::Boolean(true)
    );
}

#[test]
fn test_bit_is_set() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    assert_eq!(
        eval_at(&tree, mtu, "bit-is-set(../flags, 'up')"),
        Value::Boolean(true)
    );
    assert_eq!(
        eval_at(&tree, mtu, "bit-is-set(../flags, 'loopback')"),
        Value::Boolean(false)
    );
}

struct FixedState(HashMap<InstancePath, Scalar>);

impl StateDataProvider for FixedState {
    fn retrieve_state(
        &self,
        paths: &[InstancePath],
    ) -> Result<HashMap<InstancePath, Scalar>, ModelError> {
        Ok(paths
            .iter()
            .filter_map(|p| self.0.get(p).map(|v| (p.clone(), v.clone())))
            .collect())
    }
}

#[test]
fn test_state_leaf_fetched_through_provider() {
    let registry = build_registry();
    let tree = build_tree(&registry);
    let mtu = mtu_of(&tree, "eth0");

    let system = tree
        .child_by_qname(None, &QName::new("net", "system"))
        .expect("system");
    let counter_path = tree
        .path_of(system)
        .child(confguard_core::InstanceStep::new(QName::new("net", "error-count")));
    let state = FixedState(HashMap::from([(counter_path, Scalar::Uint(3))]));

    let parser = Parser::new();
    let expr = parser.parse("../../error-count < 10").expect("parse");
    let evaluator = Evaluator::new(&tree, Some(&state), tree.path_of(mtu));
    assert_eq!(
        evaluator.evaluate(&expr, EvalContext::at(mtu)).expect("evaluate"),
        Value::Boolean(true)
    );
}
