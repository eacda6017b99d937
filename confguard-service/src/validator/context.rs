//! Shared state threaded through the validation phases

use super::report::ValidationOutcome;
use confguard_core::{StateDataProvider, ValidationSettings, Violation};

/// Mutable per-pass state: collected violations plus the stop flag for
/// fail-fast mode
pub struct ValidationContext<'a> {
    settings: &'a ValidationSettings,
    state: &'a dyn StateDataProvider,
    outcome: ValidationOutcome,
    stopped: bool,
}

impl<'a> ValidationContext<'a> {
    /// Fresh context for one change-set
    #[must_use]
    pub fn new(settings: &'a ValidationSettings, state: &'a dyn StateDataProvider) -> Self {
        Self {
            settings,
            state,
            outcome: ValidationOutcome::default(),
            stopped: false,
        }
    }

    /// Active settings
    #[must_use]
    pub fn settings(&self) -> &ValidationSettings {
        self.settings
    }

    /// The state-data collaborator
    #[must_use]
    pub fn state(&self) -> &'a dyn StateDataProvider {
        self.state
    }

    /// Record a violation; in fail-fast mode this also stops the pass
    pub fn report(&mut self, violation: Violation) {
        self.outcome.violations.push(violation);
        if self.settings.fail_fast() {
            self.stopped = true;
        }
    }

    /// True once fail-fast mode has seen a violation
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    /// Violations reported so far
    #[must_use]
    pub fn has_violations(&self) -> bool {
        !self.outcome.violations.is_empty()
    }

    /// Append a missing-default path for the caller's injection hook
    pub fn note_missing_default(&mut self, path: confguard_core::InstancePath) {
        self.outcome.missing_defaults.push(path);
    }

    /// Finish the pass
    #[must_use]
    pub fn into_outcome(self) -> ValidationOutcome {
        self.outcome
    }
}
