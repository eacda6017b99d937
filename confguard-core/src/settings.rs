//! Validation settings
//!
//! A plain serde-backed settings struct threaded through orchestrator
//! construction; there is no hidden global configuration.

use serde::{Deserialize, Serialize};

/// How the orchestrator reports findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportMode {
    /// Stop at the first violation (most edit flows)
    #[default]
    FailFast,
    /// Collect every violation of the change-set (batched internal edits)
    CollectAll,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ValidationSettings {
    /// Reporting policy
    pub report_mode: ReportMode,
    /// Maximum nesting depth accepted by the expression parser
    pub max_expression_depth: usize,
    /// Maximum length accepted by the expression parser
    pub max_expression_length: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            report_mode: ReportMode::default(),
            max_expression_depth: 100,
            max_expression_length: 10_000,
        }
    }
}

impl ValidationSettings {
    /// Settings collecting every violation
    #[must_use]
    pub fn collect_all() -> Self {
        Self {
            report_mode: ReportMode::CollectAll,
            ..Self::default()
        }
    }

    /// Whether validation stops at the first violation
    #[must_use]
    pub fn fail_fast(&self) -> bool {
        self.report_mode == ReportMode::FailFast
    }
}
