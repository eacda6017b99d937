//! Schema mount tests: discriminator resolution, nested validation of
//! mounted subtrees, and host-prefixed violation paths.

use confguard_core::{
    ChangeKind, ChangeSet, Constraint, ErrorTag, InstanceStep, InstanceTree, MountRule,
    NoStateData, QName, Scalar, SchemaBuilder, SchemaRegistry, TypeDescriptor, ValidationSettings,
};
use confguard_service::validator::{ValidationEngine, MUST_APP_TAG};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Mounted module "usb": a config container with a mandatory speed leaf
/// and an enable-gated must constraint
fn usb_registry() -> Arc<SchemaRegistry> {
    let mut b = SchemaBuilder::new("usb");
    let config = b.container(None, "usb", "config").expect("config");
    let speed = b.leaf(Some(config), "usb", "speed", TypeDescriptor::Uint).expect("speed");
    b.mandatory(speed);
    b.leaf(Some(config), "usb", "enabled", TypeDescriptor::Boolean).expect("enabled");
    let power = b.leaf(Some(config), "usb", "power", TypeDescriptor::Uint).expect("power");
    b.constraint(power, Constraint::must("../enabled = 'true'"));
    b.build()
}

/// Host module "host": a device container whose plugin mount point is
/// keyed by the plug-type sibling leaf
fn host_registry(mounted: &[(&str, Arc<SchemaRegistry>)]) -> Arc<SchemaRegistry> {
    let mut b = SchemaBuilder::new("host");
    let device = b.container(None, "host", "device").expect("device");
    b.leaf(Some(device), "host", "plug-type", TypeDescriptor::string()).expect("plug-type");
    let plugin = b.container(Some(device), "host", "plugin").expect("plugin");
    b.mount_point(
        plugin,
        MountRule::KeyedBy {
            leaf: QName::new("host", "plug-type"),
        },
    );
    for (discriminator, registry) in mounted {
        b.mount_registry(plugin, *discriminator, Arc::clone(registry));
    }
    b.build()
}

#[test]
fn test_mounted_subtree_is_validated_under_the_host_path() {
    let usb = usb_registry();
    let host = host_registry(&[("usb", Arc::clone(&usb))]);
    let engine = ValidationEngine::new(Arc::clone(&host), ValidationSettings::collect_all())
        .expect("deploy");

    let mut tree = InstanceTree::new(Arc::clone(&host));
    let device = tree.add_container(None, "host", "device").expect("device");
    tree.set_leaf(Some(device), "host", "plug-type", Scalar::String("usb".to_string()))
        .expect("plug-type");
    let plugin = tree.add_container(Some(device), "host", "plugin").expect("plugin");
    let usb_index = tree.attach_registry(Arc::clone(&usb));
    let config = tree
        .add_mounted_container(plugin, usb_index, "usb", "config")
        .expect("config");

    // The mandatory speed leaf is absent from the mounted subtree.
    let outcome = engine.validate(&mut tree, &ChangeSet::new(), &NoStateData);
    assert_eq!(outcome.violation_count(), 1);
    let violation = outcome.first().expect("violation");
    assert_eq!(violation.error_tag, ErrorTag::MissingElement);
    assert_eq!(violation.message, "Mandatory node 'speed' is not present.");
    assert_eq!(
        violation.path,
        tree.path_of(config)
            .child(InstanceStep::new(QName::new("usb", "speed")))
    );

    tree.set_leaf(Some(config), "usb", "speed", Scalar::Uint(480)).expect("speed");
    let outcome = engine.validate(&mut tree, &ChangeSet::new(), &NoStateData);
    assert!(outcome.valid(), "unexpected: {:?}", outcome.violations);
}

#[test]
fn test_must_constraint_inside_the_mounted_registry() {
    let usb = usb_registry();
    let host = host_registry(&[("usb", Arc::clone(&usb))]);
    let engine = ValidationEngine::new(Arc::clone(&host), ValidationSettings::collect_all())
        .expect("deploy");

    let mut tree = InstanceTree::new(Arc::clone(&host));
    let device = tree.add_container(None, "host", "device").expect("device");
    tree.set_leaf(Some(device), "host", "plug-type", Scalar::String("usb".to_string()))
        .expect("plug-type");
    let plugin = tree.add_container(Some(device), "host", "plugin").expect("plugin");
    let usb_index = tree.attach_registry(Arc::clone(&usb));
    let config = tree
        .add_mounted_container(plugin, usb_index, "usb", "config")
        .expect("config");
    tree.set_leaf(Some(config), "usb", "speed", Scalar::Uint(480)).expect("speed");
    tree.set_leaf(Some(config), "usb", "enabled", Scalar::Bool(false)).expect("enabled");
    let power = tree
        .set_leaf(Some(config), "usb", "power", Scalar::Uint(500))
        .expect("power");

    let mut changes = ChangeSet::new();
    changes.push(tree.path_of(power), ChangeKind::Create);
    let outcome = engine.validate(&mut tree, &changes, &NoStateData);
    assert_eq!(outcome.violation_count(), 1);
    let violation = outcome.first().expect("violation");
    assert_eq!(violation.error_tag, ErrorTag::OperationFailed);
    assert_eq!(violation.app_tag, MUST_APP_TAG);
    assert_eq!(
        violation.message,
        "Must constraint '../enabled = 'true'' is violated."
    );
    // The violation path carries the host prefix.
    assert_eq!(violation.path, tree.path_of(power));

    tree.set_leaf(Some(config), "usb", "enabled", Scalar::Bool(true)).expect("enabled");
    let mut changes = ChangeSet::new();
    changes.push(
        tree.path_of(config)
            .child(InstanceStep::new(QName::new("usb", "enabled"))),
        ChangeKind::Merge,
    );
    let outcome = engine.validate(&mut tree, &changes, &NoStateData);
    assert!(outcome.valid(), "unexpected: {:?}", outcome.violations);
}

#[test]
fn test_unknown_discriminator_is_reported_at_the_host() {
    let usb = usb_registry();
    let host = host_registry(&[("usb", Arc::clone(&usb))]);
    let engine = ValidationEngine::new(Arc::clone(&host), ValidationSettings::collect_all())
        .expect("deploy");

    let mut tree = InstanceTree::new(Arc::clone(&host));
    let device = tree.add_container(None, "host", "device").expect("device");
    tree.set_leaf(Some(device), "host", "plug-type", Scalar::String("serial".to_string()))
        .expect("plug-type");
    let plugin = tree.add_container(Some(device), "host", "plugin").expect("plugin");

    let outcome = engine.validate(&mut tree, &ChangeSet::new(), &NoStateData);
    assert_eq!(outcome.violation_count(), 1);
    let violation = outcome.first().expect("violation");
    assert_eq!(violation.error_tag, ErrorTag::UnknownElement);
    assert_eq!(violation.message, "No mounted schema for 'serial'.");
    assert_eq!(violation.path, tree.path_of(plugin));
}

#[test]
fn test_absent_discriminator_leaf_leaves_the_point_unmounted() {
    let usb = usb_registry();
    let host = host_registry(&[("usb", Arc::clone(&usb))]);
    let engine = ValidationEngine::new(Arc::clone(&host), ValidationSettings::collect_all())
        .expect("deploy");

    let mut tree = InstanceTree::new(Arc::clone(&host));
    let device = tree.add_container(None, "host", "device").expect("device");
    tree.add_container(Some(device), "host", "plugin").expect("plugin");

    let outcome = engine.validate(&mut tree, &ChangeSet::new(), &NoStateData);
    assert!(outcome.valid(), "unexpected: {:?}", outcome.violations);
}

#[test]
fn test_static_mount_needs_no_discriminator() {
    let usb = usb_registry();
    let mut b = SchemaBuilder::new("host");
    let device = b.container(None, "host", "device").expect("device");
    let plugin = b.container(Some(device), "host", "plugin").expect("plugin");
    b.mount_point(plugin, MountRule::Static);
    b.mount_registry(plugin, "", Arc::clone(&usb));
    let host = b.build();
    let engine = ValidationEngine::new(Arc::clone(&host), ValidationSettings::collect_all())
        .expect("deploy");

    let mut tree = InstanceTree::new(Arc::clone(&host));
    let device = tree.add_container(None, "host", "device").expect("device");
    let plugin = tree.add_container(Some(device), "host", "plugin").expect("plugin");
    let usb_index = tree.attach_registry(Arc::clone(&usb));
    let config = tree
        .add_mounted_container(plugin, usb_index, "usb", "config")
        .expect("config");

    let outcome = engine.validate(&mut tree, &ChangeSet::new(), &NoStateData);
    assert_eq!(outcome.violation_count(), 1);
    assert_eq!(
        outcome.first().expect("violation").message,
        "Mandatory node 'speed' is not present."
    );

    tree.set_leaf(Some(config), "usb", "speed", Scalar::Uint(12)).expect("speed");
    let outcome = engine.validate(&mut tree, &ChangeSet::new(), &NoStateData);
    assert!(outcome.valid(), "unexpected: {:?}", outcome.violations);
}

#[test]
fn test_discriminator_leaf_matches_module_and_name() {
    let usb = usb_registry();
    let mut b = SchemaBuilder::new("host");
    let device = b.container(None, "host", "device").expect("device");
    // A same-named leaf from another module must not drive the mount.
    b.leaf(Some(device), "x", "plug-type", TypeDescriptor::string()).expect("decoy");
    b.leaf(Some(device), "host", "plug-type", TypeDescriptor::string()).expect("plug-type");
    let plugin = b.container(Some(device), "host", "plugin").expect("plugin");
    b.mount_point(
        plugin,
        MountRule::KeyedBy {
            leaf: QName::new("host", "plug-type"),
        },
    );
    b.mount_registry(plugin, "usb", Arc::clone(&usb));
    let host = b.build();
    let engine = ValidationEngine::new(Arc::clone(&host), ValidationSettings::collect_all())
        .expect("deploy");

    let mut tree = InstanceTree::new(Arc::clone(&host));
    let device = tree.add_container(None, "host", "device").expect("device");
    tree.set_leaf(Some(device), "x", "plug-type", Scalar::String("usb".to_string()))
        .expect("decoy");
    tree.set_leaf(Some(device), "host", "plug-type", Scalar::String("serial".to_string()))
        .expect("plug-type");
    let plugin = tree.add_container(Some(device), "host", "plugin").expect("plugin");

    let outcome = engine.validate(&mut tree, &ChangeSet::new(), &NoStateData);
    assert_eq!(outcome.violation_count(), 1);
    let violation = outcome.first().expect("violation");
    assert_eq!(violation.message, "No mounted schema for 'serial'.");
    assert_eq!(violation.path, tree.path_of(plugin));
}

#[test]
fn test_duplicate_mount_point_instances_reported_at_parent() {
    let usb = usb_registry();
    let host = host_registry(&[("usb", Arc::clone(&usb))]);
    let engine =
        ValidationEngine::new(Arc::clone(&host), ValidationSettings::default()).expect("deploy");

    let mut tree = InstanceTree::new(Arc::clone(&host));
    let device = tree.add_container(None, "host", "device").expect("device");
    tree.set_leaf(Some(device), "host", "plug-type", Scalar::String("usb".to_string()))
        .expect("plug-type");
    tree.add_container(Some(device), "host", "plugin").expect("plugin");
    tree.add_container(Some(device), "host", "plugin").expect("plugin");

    let outcome = engine.validate(&mut tree, &ChangeSet::new(), &NoStateData);
    assert_eq!(outcome.violation_count(), 1);
    let violation = outcome.first().expect("violation");
    assert_eq!(violation.error_tag, ErrorTag::DuplicateElement);
    assert_eq!(violation.message, "Duplicate node 'plugin'.");
    assert_eq!(violation.path, tree.path_of(device));
}

#[test]
fn test_leafref_across_the_mount_boundary() {
    let mut b = SchemaBuilder::new("usb");
    let config = b.container(None, "usb", "config").expect("config");
    b.leaf(
        Some(config),
        "usb",
        "plug-ref",
        TypeDescriptor::Leafref {
            path: "/device/plug-type".to_string(),
        },
    )
    .expect("plug-ref");
    let usb = b.build();
    let host = host_registry(&[("usb", Arc::clone(&usb))]);
    let engine = ValidationEngine::new(Arc::clone(&host), ValidationSettings::collect_all())
        .expect("deploy");

    let mut tree = InstanceTree::new(Arc::clone(&host));
    let device = tree.add_container(None, "host", "device").expect("device");
    tree.set_leaf(Some(device), "host", "plug-type", Scalar::String("usb".to_string()))
        .expect("plug-type");
    let plugin = tree.add_container(Some(device), "host", "plugin").expect("plugin");
    let usb_index = tree.attach_registry(Arc::clone(&usb));
    let config = tree
        .add_mounted_container(plugin, usb_index, "usb", "config")
        .expect("config");
    let plug_ref = tree
        .set_leaf(Some(config), "usb", "plug-ref", Scalar::String("usb".to_string()))
        .expect("plug-ref");

    // The referent lives in the host tree, above the mount boundary.
    let outcome = engine.validate(&mut tree, &ChangeSet::new(), &NoStateData);
    assert!(outcome.valid(), "unexpected: {:?}", outcome.violations);

    tree.set_leaf(Some(config), "usb", "plug-ref", Scalar::String("serial".to_string()))
        .expect("plug-ref");
    let outcome = engine.validate(&mut tree, &ChangeSet::new(), &NoStateData);
    assert_eq!(outcome.violation_count(), 1);
    let violation = outcome.first().expect("violation");
    assert_eq!(violation.error_tag, ErrorTag::DataMissing);
    assert_eq!(violation.message, "Dependency violated, 'serial' must exist");
    assert_eq!(violation.path, tree.path_of(plug_ref));
}

#[test]
fn test_host_change_re_triggers_mounted_must() {
    let mut b = SchemaBuilder::new("usb");
    let config = b.container(None, "usb", "config").expect("config");
    let power = b.leaf(Some(config), "usb", "power", TypeDescriptor::Uint).expect("power");
    b.constraint(power, Constraint::must("/device/rated = 'true'"));
    let usb = b.build();

    let mut b = SchemaBuilder::new("host");
    let device = b.container(None, "host", "device").expect("device");
    b.leaf(Some(device), "host", "plug-type", TypeDescriptor::string()).expect("plug-type");
    b.leaf(Some(device), "host", "rated", TypeDescriptor::Boolean).expect("rated");
    let plugin = b.container(Some(device), "host", "plugin").expect("plugin");
    b.mount_point(
        plugin,
        MountRule::KeyedBy {
            leaf: QName::new("host", "plug-type"),
        },
    );
    b.mount_registry(plugin, "usb", Arc::clone(&usb));
    let host = b.build();
    let engine = ValidationEngine::new(Arc::clone(&host), ValidationSettings::collect_all())
        .expect("deploy");

    let mut tree = InstanceTree::new(Arc::clone(&host));
    let device = tree.add_container(None, "host", "device").expect("device");
    tree.set_leaf(Some(device), "host", "plug-type", Scalar::String("usb".to_string()))
        .expect("plug-type");
    let rated = tree
        .set_leaf(Some(device), "host", "rated", Scalar::Bool(false))
        .expect("rated");
    let plugin = tree.add_container(Some(device), "host", "plugin").expect("plugin");
    let usb_index = tree.attach_registry(Arc::clone(&usb));
    let config = tree
        .add_mounted_container(plugin, usb_index, "usb", "config")
        .expect("config");
    let power = tree
        .set_leaf(Some(config), "usb", "power", Scalar::Uint(500))
        .expect("power");

    // The change touches only the host tree; the mounted constraint reads
    // it and must be re-evaluated.
    let mut changes = ChangeSet::new();
    changes.push(tree.path_of(rated), ChangeKind::Merge);
    let outcome = engine.validate(&mut tree, &changes, &NoStateData);
    assert_eq!(outcome.violation_count(), 1);
    let violation = outcome.first().expect("violation");
    assert_eq!(violation.error_tag, ErrorTag::OperationFailed);
    assert_eq!(violation.path, tree.path_of(power));

    tree.set_leaf(Some(device), "host", "rated", Scalar::Bool(true)).expect("rated");
    let mut changes = ChangeSet::new();
    changes.push(tree.path_of(rated), ChangeKind::Merge);
    let outcome = engine.validate(&mut tree, &changes, &NoStateData);
    assert!(outcome.valid(), "unexpected: {:?}", outcome.violations);
}

#[test]
fn test_mounted_change_re_triggers_host_must() {
    let usb = usb_registry();
    let mut b = SchemaBuilder::new("host");
    let device = b.container(None, "host", "device").expect("device");
    b.leaf(Some(device), "host", "plug-type", TypeDescriptor::string()).expect("plug-type");
    let status = b.leaf(Some(device), "host", "status", TypeDescriptor::string()).expect("status");
    b.constraint(status, Constraint::must("../plugin/config/power = '500'"));
    let plugin = b.container(Some(device), "host", "plugin").expect("plugin");
    b.mount_point(
        plugin,
        MountRule::KeyedBy {
            leaf: QName::new("host", "plug-type"),
        },
    );
    b.mount_registry(plugin, "usb", Arc::clone(&usb));
    let host = b.build();
    let engine = ValidationEngine::new(Arc::clone(&host), ValidationSettings::collect_all())
        .expect("deploy");

    let mut tree = InstanceTree::new(Arc::clone(&host));
    let device = tree.add_container(None, "host", "device").expect("device");
    tree.set_leaf(Some(device), "host", "plug-type", Scalar::String("usb".to_string()))
        .expect("plug-type");
    let status = tree
        .set_leaf(Some(device), "host", "status", Scalar::String("up".to_string()))
        .expect("status");
    let plugin = tree.add_container(Some(device), "host", "plugin").expect("plugin");
    let usb_index = tree.attach_registry(Arc::clone(&usb));
    let config = tree
        .add_mounted_container(plugin, usb_index, "usb", "config")
        .expect("config");
    tree.set_leaf(Some(config), "usb", "speed", Scalar::Uint(480)).expect("speed");
    tree.set_leaf(Some(config), "usb", "enabled", Scalar::Bool(true)).expect("enabled");
    let power = tree
        .set_leaf(Some(config), "usb", "power", Scalar::Uint(100))
        .expect("power");

    // The change touches only the mounted subtree, below the boundary the
    // host constraint reads across.
    let mut changes = ChangeSet::new();
    changes.push(tree.path_of(power), ChangeKind::Merge);
    let outcome = engine.validate(&mut tree, &changes, &NoStateData);
    assert_eq!(outcome.violation_count(), 1);
    let violation = outcome.first().expect("violation");
    assert_eq!(violation.error_tag, ErrorTag::OperationFailed);
    assert_eq!(violation.path, tree.path_of(status));

    tree.set_leaf(Some(config), "usb", "power", Scalar::Uint(500)).expect("power");
    let mut changes = ChangeSet::new();
    changes.push(tree.path_of(power), ChangeKind::Merge);
    let outcome = engine.validate(&mut tree, &changes, &NoStateData);
    assert!(outcome.valid(), "unexpected: {:?}", outcome.violations);
}
