//! Pipeline orchestration.
//!
//! The orchestrator owns one run: it drives stage transitions in order,
//! forks the image→marker and video branches once the write capabilities are
//! issued, joins them, and is the only component that writes submission
//! status. Cancellation is cooperative: every sub-operation observes the
//! run's token at its next yield point, and a cancelled run compensates by
//! deleting the record it created.

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use arforge_core::{
    AssetKind, PipelineConfig, ProgressFn, SubmissionMetadata, SubmissionStatus,
    SubmissionValidator, ValidationError,
};
use arforge_processing::{
    CompileError, CompileOutcome, CompilerService, MarkerManifest, VideoNormalizer,
};
use arforge_storage::asset_key;

use crate::events::{EventSink, PipelineEvent};
use crate::ports::{CapabilityIssuer, RecordStore};
use crate::progress::{PipelineStage, ProgressSnapshot, ProgressTracker};
use crate::upload::{UploadCoordinator, UploadError};

/// One submission: metadata plus the two asset payloads.
#[derive(Clone)]
pub struct SubmissionRequest {
    pub owner: String,
    pub metadata: SubmissionMetadata,
    pub image_filename: String,
    pub image: Bytes,
    pub video_filename: String,
    pub video: Bytes,
}

/// Terminal result of a run that finalized its record.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    /// Present only when the run produced a marker (`status == Ready`).
    pub marker: Option<MarkerManifest>,
    /// Actionable guidance for a `NeedsBetterSource` outcome. Kept apart
    /// from error detail; a rejection is not an error.
    pub guidance: Option<String>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid submission: {0}")]
    InvalidInput(#[from] ValidationError),

    /// User-initiated cancellation. The record was deleted; no status was
    /// written and no error detail exists.
    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Pipeline failed: {detail}")]
    Failed {
        /// The record left behind in `error` state, when one survived.
        record_id: Option<Uuid>,
        detail: String,
    },
}

/// A started pipeline run.
#[derive(Debug)]
pub struct PipelineRun {
    token: CancellationToken,
    pub progress: watch::Receiver<ProgressSnapshot>,
    handle: JoinHandle<Result<PipelineOutcome, PipelineError>>,
}

impl PipelineRun {
    /// Request cooperative cancellation; in-flight sub-operations unwind at
    /// their next yield point. A no-op once the run has completed.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A handle that cancels this run when fired, for callers that hand
    /// cancellation to a signal handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn join(self) -> Result<PipelineOutcome, PipelineError> {
        self.handle.await.map_err(|e| PipelineError::Failed {
            record_id: None,
            detail: format!("Pipeline task failed: {}", e),
        })?
    }
}

/// Outcome of the image→marker branch.
enum ImageBranch {
    Marker {
        marker_key: String,
        manifest: MarkerManifest,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug)]
enum BranchError {
    Cancelled,
    Failed(String),
}

impl BranchError {
    fn from_upload(context: &str, err: UploadError) -> Self {
        match err {
            UploadError::Cancelled => BranchError::Cancelled,
            other => BranchError::Failed(format!("{}: {}", context, other)),
        }
    }
}

#[derive(Clone)]
pub struct PipelineOrchestrator {
    records: Arc<dyn RecordStore>,
    issuer: Arc<dyn CapabilityIssuer>,
    uploader: UploadCoordinator,
    compiler: CompilerService,
    normalizer: Arc<dyn VideoNormalizer>,
    sink: Arc<dyn EventSink>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        issuer: Arc<dyn CapabilityIssuer>,
        compiler: CompilerService,
        normalizer: Arc<dyn VideoNormalizer>,
        sink: Arc<dyn EventSink>,
        config: PipelineConfig,
    ) -> Self {
        let uploader = UploadCoordinator::new(config.upload_chunk_bytes);
        Self {
            records,
            issuer,
            uploader,
            compiler,
            normalizer,
            sink,
            config,
        }
    }

    /// Validate the submission shape and start a run.
    ///
    /// Validation failures surface before anything touches a remote service.
    pub fn start(&self, request: SubmissionRequest) -> Result<PipelineRun, PipelineError> {
        let validator = SubmissionValidator::from_config(&self.config);
        validator.validate_metadata(&request.metadata)?;
        let image_ext = validator.validate_image(&request.image_filename, request.image.len())?;
        let video_ext = validator.validate_video(&request.video_filename, request.video.len())?;

        let token = CancellationToken::new();
        let (tracker, progress) = ProgressTracker::with_sink(self.sink.clone());

        let this = self.clone();
        let run_token = token.clone();
        let handle = tokio::spawn(async move {
            this.drive(request, image_ext, video_ext, run_token, tracker)
                .await
        });

        Ok(PipelineRun {
            token,
            progress,
            handle,
        })
    }

    async fn drive(
        self,
        request: SubmissionRequest,
        image_ext: String,
        video_ext: String,
        user_token: CancellationToken,
        tracker: Arc<ProgressTracker>,
    ) -> Result<PipelineOutcome, PipelineError> {
        // Branch failures cancel the child so the surviving branch unwinds;
        // only the parent firing means the user asked to stop.
        let run_token = user_token.child_token();
        let owner = request.owner.clone();

        // Stage: conditional video normalization, before any server call.
        self.enter_stage(&tracker, PipelineStage::NormalizingVideo);
        let normalized = tokio::select! {
            _ = run_token.cancelled() => return self.cancelled(None).await,
            result = self.normalizer.normalize(
                request.video.to_vec(),
                &video_ext,
                self.progress_fn(&tracker, PipelineStage::NormalizingVideo),
            ) => result.map_err(|e| {
                let detail = format!("Video normalization failed: {}", e);
                self.sink.emit(&PipelineEvent::Aborted { detail: detail.clone() });
                PipelineError::Failed { record_id: None, detail }
            })?,
        };
        let video = Bytes::from(normalized.data);
        let video_ext = normalized.extension;

        // Stage: create the record, the sole source of processing status.
        self.enter_stage(&tracker, PipelineStage::CreatingRecord);
        let submission = match self
            .records
            .create(
                &owner,
                &request.metadata.title,
                request.metadata.description.as_deref(),
            )
            .await
        {
            Ok(submission) => submission,
            Err(e) => {
                let detail = format!("Record creation failed: {}", e);
                self.sink.emit(&PipelineEvent::Aborted { detail: detail.clone() });
                return Err(PipelineError::Failed {
                    record_id: None,
                    detail,
                });
            }
        };
        let id = submission.id;

        // Keys embed the record id, so they exist only from here on. They are
        // locations, never capabilities.
        let image_key = asset_key(&owner, id, AssetKind::Image, &image_ext);
        let video_key = asset_key(&owner, id, AssetKind::Video, &video_ext);
        if let Err(e) = self
            .records
            .set_asset_keys(&owner, id, &image_key, &video_key)
            .await
        {
            return Err(self
                .fail(&owner, id, format!("Recording asset keys failed: {}", e))
                .await);
        }
        tracker.stage_progress(PipelineStage::CreatingRecord, 100.0);

        if run_token.is_cancelled() {
            return self.cancelled(Some((&owner, id))).await;
        }

        // Up-front write capabilities for the two submitted assets. The first
        // issuance failing right after creation rolls the record back; once
        // the image grant exists the record reflects failures as status.
        let image_grant = match self
            .issuer
            .grant_write(
                &image_key,
                content_type_for(&image_ext),
                self.config.write_grant_ttl,
            )
            .await
        {
            Ok(grant) => grant,
            Err(e) => {
                let _ = self.records.delete(&owner, id).await;
                let detail = format!("Image write capability: {}", e);
                self.sink.emit(&PipelineEvent::Aborted { detail: detail.clone() });
                return Err(PipelineError::Failed {
                    record_id: None,
                    detail,
                });
            }
        };
        let video_grant = match self
            .issuer
            .grant_write(
                &video_key,
                content_type_for(&video_ext),
                self.config.write_grant_ttl,
            )
            .await
        {
            Ok(grant) => grant,
            Err(e) => {
                return Err(self
                    .fail(&owner, id, format!("Video write capability: {}", e))
                    .await);
            }
        };

        if run_token.is_cancelled() {
            return self.cancelled(Some((&owner, id))).await;
        }

        // Fork: image→compile→marker and the video transfer proceed without
        // waiting on each other. Completion requires both.
        let image_branch: JoinHandle<Result<ImageBranch, BranchError>> = {
            let this = self.clone();
            let tracker = tracker.clone();
            let token = run_token.clone();
            let owner = owner.clone();
            let image = request.image.clone();
            let image_ct = content_type_for(&image_ext).to_string();
            tokio::spawn(async move {
                let result = this
                    .run_image_branch(&owner, id, image, &image_ct, image_grant, &tracker, &token)
                    .await;
                if matches!(result, Err(BranchError::Failed(_))) {
                    token.cancel();
                }
                result
            })
        };

        let video_branch: JoinHandle<Result<(), BranchError>> = {
            let this = self.clone();
            let tracker = tracker.clone();
            let token = run_token.clone();
            let video_ct = content_type_for(&video_ext).to_string();
            tokio::spawn(async move {
                this.enter_stage(&tracker, PipelineStage::UploadingVideo);
                let result = this
                    .uploader
                    .upload(
                        video,
                        &video_grant,
                        &video_ct,
                        this.progress_fn(&tracker, PipelineStage::UploadingVideo),
                        &token,
                    )
                    .await
                    .map_err(|e| BranchError::from_upload("Video upload", e));
                if matches!(result, Err(BranchError::Failed(_))) {
                    token.cancel();
                }
                result
            })
        };

        // Join: neither branch's success masks the other's failure.
        let (image_result, video_result) = tokio::join!(image_branch, video_branch);
        let image_result = flatten_branch(image_result);
        let video_result = flatten_branch(video_result);

        if user_token.is_cancelled() {
            return self.cancelled(Some((&owner, id))).await;
        }

        let failure = [
            image_result.as_ref().err(),
            video_result.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .find_map(|e| match e {
            BranchError::Failed(detail) => Some(detail.clone()),
            BranchError::Cancelled => None,
        });
        if let Some(detail) = failure {
            return Err(self.fail(&owner, id, detail).await);
        }
        let image_outcome = match (image_result, video_result) {
            (Ok(outcome), Ok(())) => outcome,
            // Cancelled branches without a user cancellation or a failing
            // sibling cannot finalize the record meaningfully.
            _ => {
                return Err(self
                    .fail(&owner, id, "Pipeline branch cancelled unexpectedly".to_string())
                    .await)
            }
        };

        match image_outcome {
            ImageBranch::Rejected { reason } => {
                if let Err(e) = self.records.mark_needs_better_source(&owner, id).await {
                    return Err(self
                        .fail(&owner, id, format!("Status finalization failed: {}", e))
                        .await);
                }
                self.sink.emit(&PipelineEvent::Warning {
                    message: reason.clone(),
                });
                self.sink.emit(&PipelineEvent::Finished {
                    submission_id: id,
                    status: SubmissionStatus::NeedsBetterSource,
                });
                Ok(PipelineOutcome {
                    submission_id: id,
                    status: SubmissionStatus::NeedsBetterSource,
                    marker: None,
                    guidance: Some(reason),
                })
            }
            ImageBranch::Marker {
                marker_key,
                manifest,
            } => {
                if let Err(e) = self.records.mark_ready(&owner, id, &marker_key).await {
                    return Err(self
                        .fail(&owner, id, format!("Status finalization failed: {}", e))
                        .await);
                }
                tracker.complete();
                self.sink.emit(&PipelineEvent::Finished {
                    submission_id: id,
                    status: SubmissionStatus::Ready,
                });
                Ok(PipelineOutcome {
                    submission_id: id,
                    status: SubmissionStatus::Ready,
                    marker: Some(manifest),
                    guidance: None,
                })
            }
        }
    }

    /// Image branch: upload, compile, then (only after compilation succeeds)
    /// provision and upload the marker artifact.
    #[allow(clippy::too_many_arguments)]
    async fn run_image_branch(
        &self,
        owner: &str,
        id: Uuid,
        image: Bytes,
        image_content_type: &str,
        image_grant: arforge_core::CapabilityGrant,
        tracker: &Arc<ProgressTracker>,
        token: &CancellationToken,
    ) -> Result<ImageBranch, BranchError> {
        self.enter_stage(tracker, PipelineStage::UploadingImage);
        self.uploader
            .upload(
                image.clone(),
                &image_grant,
                image_content_type,
                self.progress_fn(tracker, PipelineStage::UploadingImage),
                token,
            )
            .await
            .map_err(|e| BranchError::from_upload("Image upload", e))?;

        self.enter_stage(tracker, PipelineStage::CompilingMarker);
        let outcome = self
            .compiler
            .compile_bytes(
                &image,
                self.progress_fn(tracker, PipelineStage::CompilingMarker),
                token,
            )
            .await;

        let artifact = match outcome {
            Ok(CompileOutcome::Compiled(artifact)) => artifact,
            Ok(CompileOutcome::Rejected { reason }) => {
                return Ok(ImageBranch::Rejected { reason })
            }
            Err(CompileError::Cancelled) => return Err(BranchError::Cancelled),
            Err(e) => {
                return Err(BranchError::Failed(format!(
                    "Marker compilation failed: {}",
                    e
                )))
            }
        };

        // The artifact's size is unknown before compilation, so the marker
        // write capability is never issued speculatively.
        let marker_key = asset_key(owner, id, AssetKind::Marker, "mind");
        let marker_grant = self
            .issuer
            .grant_write(
                &marker_key,
                "application/octet-stream",
                self.config.write_grant_ttl,
            )
            .await
            .map_err(|e| BranchError::Failed(format!("Marker write capability: {}", e)))?;

        self.enter_stage(tracker, PipelineStage::UploadingMarker);
        let manifest = artifact.manifest.clone();
        self.uploader
            .upload(
                Bytes::from(artifact.data),
                &marker_grant,
                "application/octet-stream",
                self.progress_fn(tracker, PipelineStage::UploadingMarker),
                token,
            )
            .await
            .map_err(|e| BranchError::from_upload("Marker upload", e))?;

        Ok(ImageBranch::Marker {
            marker_key,
            manifest,
        })
    }

    /// Mark the record failed and surface the detail. The orchestrator is the
    /// only status writer, so a failed finalization is logged, not retried.
    async fn fail(&self, owner: &str, id: Uuid, detail: String) -> PipelineError {
        if let Err(e) = self.records.mark_error(owner, id, &detail).await {
            tracing::error!(
                submission_id = %id,
                error = %e,
                "Failed to record error status"
            );
        }
        self.sink.emit(&PipelineEvent::Finished {
            submission_id: id,
            status: SubmissionStatus::Error,
        });
        PipelineError::Failed {
            record_id: Some(id),
            detail,
        }
    }

    /// Compensating cleanup for a cancelled run: no orphaned `processing`
    /// record may persist, and no status is written.
    async fn cancelled(&self, record: Option<(&str, Uuid)>) -> Result<PipelineOutcome, PipelineError> {
        if let Some((owner, id)) = record {
            match self.records.delete(owner, id).await {
                Ok(_) => {}
                Err(e) => {
                    self.sink.emit(&PipelineEvent::Warning {
                        message: format!("Compensating delete failed: {}", e),
                    });
                }
            }
        }
        self.sink.emit(&PipelineEvent::Cancelled);
        Err(PipelineError::Cancelled)
    }

    fn enter_stage(&self, tracker: &Arc<ProgressTracker>, stage: PipelineStage) {
        tracker.enter_stage(stage);
    }

    fn progress_fn(&self, tracker: &Arc<ProgressTracker>, stage: PipelineStage) -> ProgressFn {
        let tracker = tracker.clone();
        Arc::new(move |percent| {
            tracker.stage_progress(stage, percent);
        })
    }
}

fn flatten_branch<T>(
    joined: Result<Result<T, BranchError>, tokio::task::JoinError>,
) -> Result<T, BranchError> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(BranchError::Failed(format!("Branch task failed: {}", e))),
    }
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mind" => "application/octet-stream",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(content_type_for("png"), "image/png");
        assert_eq!(content_type_for("jpeg"), "image/jpeg");
        assert_eq!(content_type_for("mp4"), "video/mp4");
        assert_eq!(content_type_for("bin"), "application/octet-stream");
    }
}
