//! Arforge Core Library
//!
//! Shared models, configuration, and validation for the arforge asset
//! pipeline. This crate holds the submission record and its status state
//! machine, the transient capability grant type, environment-driven
//! configuration, and input validation for submissions.

pub mod config;
pub mod models;
pub mod validation;

use std::sync::Arc;

pub use config::{PipelineConfig, StorageBackend, StorageConfig};
pub use models::{AssetKind, CapabilityGrant, CapabilityOp, Submission, SubmissionStatus};
pub use validation::{
    file_extension, sanitize_filename, SubmissionMetadata, SubmissionValidator, ValidationError,
};

/// Fractional progress callback, 0.0..=100.0.
///
/// Shared by every long-running pipeline operation (uploads, compilation,
/// normalization). Callbacks must be cheap; they run at suspension points of
/// the reporting operation.
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// A progress callback that discards reports.
pub fn noop_progress() -> ProgressFn {
    Arc::new(|_| {})
}
