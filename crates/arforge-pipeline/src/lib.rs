//! Arforge Pipeline Library
//!
//! The client-side asset pipeline: upload coordination, weighted progress
//! projection, structured pipeline events, and the orchestrator that forks
//! the image→marker and video branches, joins them, and finalizes the
//! submission record's status.
//!
//! Collaborator seams ([`RecordStore`], [`CapabilityIssuer`]) are traits so
//! the orchestrator runs against fakes in tests; production implementations
//! are the `arforge-db` repository and the `arforge-storage` provisioner,
//! wired up in `adapters`.

pub mod adapters;
pub mod events;
pub mod orchestrator;
pub mod ports;
pub mod progress;
pub mod upload;

pub use events::{EventSink, PipelineEvent, TracingEventSink};
pub use orchestrator::{
    PipelineError, PipelineOrchestrator, PipelineOutcome, PipelineRun, SubmissionRequest,
};
pub use ports::{CapabilityIssuer, RecordStore};
pub use progress::{PipelineStage, ProgressSnapshot, ProgressTracker};
pub use upload::{UploadCoordinator, UploadError};
