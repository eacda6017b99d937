//! Collaborator traits consumed by the validation engine
//!
//! State-data retrieval is the one blocking seam the engine crosses: a
//! must/when expression may read operational nodes that are not part of the
//! configuration tree. The call is synchronous and narrow; its latency is
//! the caller's concern.

use crate::error::ModelError;
use crate::path::InstancePath;
use crate::value::Scalar;
use std::collections::HashMap;

/// Supplies operational/state leaf values for paths absent from the
/// configuration tree
pub trait StateDataProvider: Send + Sync {
    /// Retrieve the values at the given instance paths; paths with no
    /// state value are simply absent from the result map
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying state source fails; the engine
    /// converts that into a violation on the constraint that asked.
    fn retrieve_state(
        &self,
        paths: &[InstancePath],
    ) -> Result<HashMap<InstancePath, Scalar>, ModelError>;
}

/// A provider with no state data; every lookup comes back empty
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStateData;

impl StateDataProvider for NoStateData {
    fn retrieve_state(
        &self,
        _paths: &[InstancePath],
    ) -> Result<HashMap<InstancePath, Scalar>, ModelError> {
        Ok(HashMap::new())
    }
}
