//! Validation orchestration: phases, context, reporting

pub mod context;
pub mod engine;
pub mod report;
pub mod structural;

pub use context::ValidationContext;
pub use engine::ValidationEngine;
pub use report::{ValidationOutcome, MUST_APP_TAG, WHEN_APP_TAG};
