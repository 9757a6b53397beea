//! Data models

pub mod capability;
pub mod submission;

pub use capability::{CapabilityGrant, CapabilityOp};
pub use submission::{AssetKind, Submission, SubmissionStatus};
