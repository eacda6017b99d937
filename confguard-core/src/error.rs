//! RFC-6241-style error records and model-level errors
//!
//! Two error universes exist. Validation-time findings are recovered into
//! [`Violation`] records and surfaced to the edit/commit pipeline; they are
//! never thrown across the orchestrator boundary. Deployment-time errors
//! (schema graph defects found while building the dependency index) live in
//! `confguard-service` and abort schema deployment.

use crate::path::InstancePath;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Enumerated NETCONF error-tag values produced by validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorTag {
    /// A value fails its type or pattern restriction
    InvalidValue,
    /// A mandatory node is absent
    MissingElement,
    /// A node may not exist under the current configuration (`when`)
    UnknownElement,
    /// Conflicting elements, e.g. members of two cases of one choice
    BadElement,
    /// Two instances of a node the schema allows only once
    DuplicateElement,
    /// Cardinality above max-elements
    TooManyElements,
    /// Cardinality below min-elements
    TooFewElements,
    /// A referenced instance is missing (leafref)
    DataMissing,
    /// A `must` expression is violated, or evaluation faulted
    OperationFailed,
}

impl ErrorTag {
    /// The wire-level tag name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::DuplicateElement => "duplicate-element",
            ErrorTag::TooManyElements => "too-many-elements",
            ErrorTag::TooFewElements => "too-few-elements",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationFailed => "operation-failed",
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// NETCONF error-type of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    /// Application-layer constraint
    Application,
    /// Protocol-layer defect
    Protocol,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorType::Application => write!(f, "application"),
            ErrorType::Protocol => write!(f, "protocol"),
        }
    }
}

/// Severity of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Non-fatal finding
    Warning,
    /// Fatal finding: the change-set is rejected
    Error,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Error => write!(f, "error"),
        }
    }
}

/// One validation finding, the sole externally observable artifact of the
/// engine; field semantics match the protocol's wire-level error model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Instance path of the violating node
    pub path: InstancePath,
    /// Enumerated error tag
    pub error_tag: ErrorTag,
    /// Error type
    pub error_type: ErrorType,
    /// Severity
    pub severity: ErrorSeverity,
    /// Application tag: constraint-declared or a generated default
    pub app_tag: String,
    /// Human-readable message reproducing the declared expression text
    pub message: String,
}

impl Violation {
    /// Build an application-level error violation
    pub fn error(
        path: InstancePath,
        error_tag: ErrorTag,
        app_tag: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path,
            error_tag,
            error_type: ErrorType::Application,
            severity: ErrorSeverity::Error,
            app_tag: app_tag.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {}] {}: {}",
            self.error_type, self.error_tag, self.severity, self.path, self.message
        )
    }
}

/// Errors raised by model construction and navigation
#[derive(Debug, Error)]
pub enum ModelError {
    /// A schema node already has a sibling with this name
    #[error("Schema node '{name}' declared twice under one parent")]
    DuplicateSchemaChild {
        /// Qualified name of the offending node
        name: String,
    },

    /// No schema child with this name exists under the parent
    #[error("Unknown schema child '{name}' under '{parent}'")]
    UnknownSchemaChild {
        /// Qualified name that failed to resolve
        name: String,
        /// Parent schema path
        parent: String,
    },

    /// A list operation addressed a non-list schema node
    #[error("Schema node '{name}' is not a list")]
    NotAList {
        /// Qualified name of the node
        name: String,
    },

    /// List-entry keys do not match the declared key leaves
    #[error("Key tuple for list '{name}' must name exactly the declared keys: {expected}")]
    BadKeyTuple {
        /// Qualified list name
        name: String,
        /// Declared key leaves
        expected: String,
    },

    /// A state-data collaborator failed to deliver requested paths
    #[error("State data retrieval failed: {reason}")]
    StateRetrieval {
        /// Description from the collaborator
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{InstanceStep, QName};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_tag_wire_names() {
        assert_eq!(ErrorTag::DataMissing.to_string(), "data-missing");
        assert_eq!(ErrorTag::TooFewElements.to_string(), "too-few-elements");
        assert_eq!(ErrorTag::OperationFailed.to_string(), "operation-failed");
    }

    #[test]
    fn test_violation_display_carries_path_and_message() {
        let path =
            InstancePath::root().child(InstanceStep::new(QName::new("sys", "hostname")));
        let violation = Violation::error(
            path,
            ErrorTag::MissingElement,
            "missing-element",
            "Missing mandatory node hostname.",
        );
        assert_eq!(
            violation.to_string(),
            "[application missing-element error] /sys:hostname: Missing mandatory node hostname."
        );
    }
}
