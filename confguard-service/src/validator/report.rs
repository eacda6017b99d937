//! Validation outcome and message templates
//!
//! Message text is part of the external contract; clients parse these
//! strings programmatically, so the templates here are fixed.

use confguard_core::{InstancePath, QName, Violation};
use serde::{Deserialize, Serialize};

/// Default app-tag for generated must violations
pub const MUST_APP_TAG: &str = "must-violation";
/// Default app-tag for generated when violations
pub const WHEN_APP_TAG: &str = "when-violation";

/// Aggregated result of one validation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Violations in deterministic order
    pub violations: Vec<Violation>,
    /// Absent leaves with declared defaults, listed only after a clean
    /// pass for the caller's default-injection hook
    pub missing_defaults: Vec<InstancePath>,
}

impl ValidationOutcome {
    /// True when no violations were reported
    #[must_use]
    pub fn valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of reported violations
    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    /// First violation, the one fail-fast mode stops on
    #[must_use]
    pub fn first(&self) -> Option<&Violation> {
        self.violations.first()
    }
}

/// "Reached min-elements N, cannot delete more child X."
#[must_use]
pub fn min_elements_message(min: u32, child: &QName) -> String {
    format!("Reached min-elements {min}, cannot delete more child {}.", child.name)
}

/// "Reached max-elements N, cannot add more child X."
#[must_use]
pub fn max_elements_message(max: u32, child: &QName) -> String {
    format!("Reached max-elements {max}, cannot add more child {}.", child.name)
}

/// "Dependency violated, 'V' must exist"
#[must_use]
pub fn leafref_message(value: &str) -> String {
    format!("Dependency violated, '{value}' must exist")
}

/// Generated must-violation message, expression text verbatim
#[must_use]
pub fn must_message(expression: &str) -> String {
    format!("Must constraint '{expression}' is violated.")
}

/// Generated when-violation message, expression text verbatim
#[must_use]
pub fn when_message(expression: &str) -> String {
    format!("When condition '{expression}' is false.")
}

/// Mandatory-presence message
#[must_use]
pub fn mandatory_message(child: &QName) -> String {
    format!("Mandatory node '{}' is not present.", child.name)
}

/// Duplicate-singleton message, reported at the parent path
#[must_use]
pub fn duplicate_message(child: &QName) -> String {
    format!("Duplicate node '{}'.", child.name)
}

/// Union failure, member failures joined with " or "
#[must_use]
pub fn union_message(failures: &[String]) -> String {
    failures.join(" or ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cardinality_messages() {
        let child = QName::new("t", "server");
        assert_eq!(
            min_elements_message(2, &child),
            "Reached min-elements 2, cannot delete more child server."
        );
        assert_eq!(
            max_elements_message(8, &child),
            "Reached max-elements 8, cannot add more child server."
        );
    }

    #[test]
    fn test_leafref_message() {
        assert_eq!(leafref_message("2"), "Dependency violated, '2' must exist");
    }

    #[test]
    fn test_must_message_reproduces_expression_verbatim() {
        let expression = "count(../interface[re-match(name, 'eth0\\.\\d+')]) > 1";
        assert_eq!(
            must_message(expression),
            format!("Must constraint '{expression}' is violated.")
        );
    }

    #[test]
    fn test_union_message_joins_with_or() {
        let failures = vec![
            "'x' is not a valid int64".to_string(),
            "'x' is not a valid boolean".to_string(),
        ];
        assert_eq!(
            union_message(&failures),
            "'x' is not a valid int64 or 'x' is not a valid boolean"
        );
    }
}
