//! Namespace-qualified schema and instance paths
//!
//! A schema path addresses a node in a schema registry by its ordered
//! `{module, name}` steps. An instance path additionally carries list-key
//! predicates and leaf-list value predicates, and renders in the
//! NETCONF error-path form `/m:list[m:key='v']/m:leaf`.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// A namespace-qualified node name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QName {
    /// Module (namespace prefix) the node belongs to
    pub module: String,
    /// Local node name
    pub name: String,
}

impl QName {
    /// Create a qualified name
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

/// An absolute schema-level path: ordered qualified names from a schema root
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaPath {
    steps: SmallVec<[QName; 6]>,
}

impl SchemaPath {
    /// The empty path (a schema root)
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from qualified names
    pub fn from_steps(steps: impl IntoIterator<Item = QName>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Append a step, returning the extended path
    #[must_use]
    pub fn child(&self, qname: QName) -> Self {
        let mut steps = self.steps.clone();
        steps.push(qname);
        Self { steps }
    }

    /// The parent path, or `None` at the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.steps.is_empty() {
            return None;
        }
        let mut steps = self.steps.clone();
        steps.pop();
        Some(Self { steps })
    }

    /// The final step name, if any
    #[must_use]
    pub fn last(&self) -> Option<&QName> {
        self.steps.last()
    }

    /// Ordered steps of this path
    #[must_use]
    pub fn steps(&self) -> &[QName] {
        &self.steps
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether this is the root path
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "/");
        }
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

/// One step of an instance path: a node name plus the predicates that pin
/// a concrete instance (list keys, or the value of a leaf-list entry)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceStep {
    /// Qualified node name
    pub qname: QName,
    /// Key-leaf name/value pairs for list entries, in key declaration order
    pub keys: SmallVec<[(String, String); 2]>,
    /// Value predicate for leaf-list entries (`[.='value']`)
    pub value: Option<String>,
}

impl InstanceStep {
    /// A keyless step (container, leaf, choice member)
    #[must_use]
    pub fn new(qname: QName) -> Self {
        Self {
            qname,
            keys: SmallVec::new(),
            value: None,
        }
    }

    /// A list-entry step pinned by its key tuple
    pub fn keyed(
        qname: QName,
        keys: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            qname,
            keys: keys.into_iter().collect(),
            value: None,
        }
    }

    /// A leaf-list entry step pinned by its value
    pub fn valued(qname: QName, value: impl Into<String>) -> Self {
        Self {
            qname,
            keys: SmallVec::new(),
            value: Some(value.into()),
        }
    }
}

impl fmt::Display for InstanceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qname)?;
        for (key, value) in &self.keys {
            write!(f, "[{}:{}='{}']", self.qname.module, key, value)?;
        }
        if let Some(value) = &self.value {
            write!(f, "[.='{value}']")?;
        }
        Ok(())
    }
}

/// An absolute instance path addressing one concrete node in a
/// configuration tree
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstancePath {
    steps: Vec<InstanceStep>,
}

impl InstancePath {
    /// The tree root
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from steps
    pub fn from_steps(steps: impl IntoIterator<Item = InstanceStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Append a step, returning the extended path
    #[must_use]
    pub fn child(&self, step: InstanceStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    /// The parent path, or `None` at the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.steps.is_empty() {
            return None;
        }
        let mut steps = self.steps.clone();
        steps.pop();
        Some(Self { steps })
    }

    /// Ordered steps of this path
    #[must_use]
    pub fn steps(&self) -> &[InstanceStep] {
        &self.steps
    }

    /// The final step, if any
    #[must_use]
    pub fn last(&self) -> Option<&InstanceStep> {
        self.steps.last()
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether this is the root path
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The schema-level path obtained by dropping all predicates
    #[must_use]
    pub fn schema_path(&self) -> SchemaPath {
        SchemaPath::from_steps(self.steps.iter().map(|s| s.qname.clone()))
    }

    /// True when `other` addresses this node or one of its descendants
    #[must_use]
    pub fn is_prefix_of(&self, other: &InstancePath) -> bool {
        self.steps.len() <= other.steps.len()
            && self.steps.iter().zip(other.steps.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "/");
        }
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_schema_path_display() {
        let path = SchemaPath::root()
            .child(QName::new("sys", "interfaces"))
            .child(QName::new("sys", "interface"));
        assert_eq!(path.to_string(), "/sys:interfaces/sys:interface");
        assert_eq!(SchemaPath::root().to_string(), "/");
    }

    #[test]
    fn test_instance_path_display_with_keys() {
        let path = InstancePath::root()
            .child(InstanceStep::new(QName::new("net", "routing")))
            .child(InstanceStep::keyed(
                QName::new("net", "route"),
                [("prefix".to_string(), "10.0.0.0/8".to_string())],
            ));
        assert_eq!(
            path.to_string(),
            "/net:routing/net:route[net:prefix='10.0.0.0/8']"
        );
    }

    #[test]
    fn test_instance_path_leaf_list_value_predicate() {
        let path = InstancePath::root()
            .child(InstanceStep::valued(QName::new("net", "dns-server"), "1.1.1.1"));
        assert_eq!(path.to_string(), "/net:dns-server[.='1.1.1.1']");
    }

    #[test]
    fn test_prefix_detection() {
        let host = InstancePath::root().child(InstanceStep::new(QName::new("hw", "slot")));
        let inner = host.child(InstanceStep::new(QName::new("card", "port")));
        assert!(host.is_prefix_of(&inner));
        assert!(host.is_prefix_of(&host));
        assert!(!inner.is_prefix_of(&host));
    }

    #[test]
    fn test_schema_path_of_instance_path_drops_predicates() {
        let path = InstancePath::root().child(InstanceStep::keyed(
            QName::new("net", "route"),
            [("prefix".to_string(), "0.0.0.0/0".to_string())],
        ));
        assert_eq!(path.schema_path().to_string(), "/net:route");
    }
}
