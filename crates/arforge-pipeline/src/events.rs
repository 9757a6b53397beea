//! Structured pipeline events.
//!
//! The orchestrator reports everything observable through a single event
//! sink, keeping observability out of the control flow. The default sink
//! forwards to `tracing`.

use uuid::Uuid;

use arforge_core::SubmissionStatus;

use crate::progress::ProgressSnapshot;

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageEntered {
        snapshot: ProgressSnapshot,
    },
    Progress {
        snapshot: ProgressSnapshot,
    },
    Warning {
        message: String,
    },
    /// The run reached a terminal status on its record.
    Finished {
        submission_id: Uuid,
        status: SubmissionStatus,
    },
    /// The run failed before a record existed, or after its record was
    /// removed.
    Aborted {
        detail: String,
    },
    Cancelled,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Default sink: structured logs.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageEntered { snapshot } => {
                tracing::info!(stage = %snapshot.stage, overall = snapshot.overall, "Pipeline stage entered");
            }
            PipelineEvent::Progress { snapshot } => {
                tracing::debug!(
                    stage = %snapshot.stage,
                    overall = snapshot.overall,
                    video_percent = snapshot.video_percent,
                    "Pipeline progress"
                );
            }
            PipelineEvent::Warning { message } => {
                tracing::warn!(message = %message, "Pipeline warning");
            }
            PipelineEvent::Finished {
                submission_id,
                status,
            } => {
                tracing::info!(submission_id = %submission_id, status = %status, "Pipeline finished");
            }
            PipelineEvent::Aborted { detail } => {
                tracing::error!(detail = %detail, "Pipeline aborted");
            }
            PipelineEvent::Cancelled => {
                tracing::info!("Pipeline cancelled");
            }
        }
    }
}
