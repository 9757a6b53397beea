//! Compilation service: hard timeout and off-task execution.
//!
//! A hung external capability would otherwise strand the pipeline
//! indefinitely, so every compilation runs inside its own task under a
//! deadline, and the caller's cancellation token is observed while it runs.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use arforge_core::ProgressFn;

use crate::compiler::{CompileError, CompileOutcome, FeatureCompiler, SourceImage};

#[derive(Clone)]
pub struct CompilerService {
    compiler: Arc<dyn FeatureCompiler>,
    timeout: Duration,
}

impl CompilerService {
    pub fn new(compiler: Arc<dyn FeatureCompiler>, timeout: Duration) -> Self {
        Self { compiler, timeout }
    }

    /// Decode an encoded image and compile it.
    pub async fn compile_bytes(
        &self,
        data: &[u8],
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<CompileOutcome, CompileError> {
        let image = SourceImage::decode(data)?;
        self.compile(image, on_progress, cancel).await
    }

    /// Run one compilation under the configured deadline.
    pub async fn compile(
        &self,
        image: SourceImage,
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<CompileOutcome, CompileError> {
        let compiler = self.compiler.clone();
        let mut handle = tokio::spawn(async move { compiler.compile(image, on_progress).await });

        tokio::select! {
            _ = cancel.cancelled() => {
                handle.abort();
                Err(CompileError::Cancelled)
            }
            _ = tokio::time::sleep(self.timeout) => {
                handle.abort();
                tracing::error!(timeout_secs = self.timeout.as_secs(), "Compilation timed out");
                Err(CompileError::TimedOut { limit: self.timeout })
            }
            result = &mut handle => match result {
                Ok(outcome) => outcome,
                Err(e) => Err(CompileError::Execution(format!("Compilation task failed: {}", e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{MarkerArtifact, MarkerManifest};
    use async_trait::async_trait;

    struct InstantCompiler;

    #[async_trait]
    impl FeatureCompiler for InstantCompiler {
        async fn compile(
            &self,
            image: SourceImage,
            on_progress: ProgressFn,
        ) -> Result<CompileOutcome, CompileError> {
            on_progress(100.0);
            Ok(CompileOutcome::Compiled(MarkerArtifact {
                data: vec![1, 2, 3],
                manifest: MarkerManifest {
                    feature_count: 9,
                    source_width: image.width,
                    source_height: image.height,
                },
            }))
        }
    }

    struct HangingCompiler;

    #[async_trait]
    impl FeatureCompiler for HangingCompiler {
        async fn compile(
            &self,
            _image: SourceImage,
            _on_progress: ProgressFn,
        ) -> Result<CompileOutcome, CompileError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    struct RejectingCompiler;

    #[async_trait]
    impl FeatureCompiler for RejectingCompiler {
        async fn compile(
            &self,
            _image: SourceImage,
            _on_progress: ProgressFn,
        ) -> Result<CompileOutcome, CompileError> {
            Ok(CompileOutcome::Rejected {
                reason: "near-uniform pixel content".to_string(),
            })
        }
    }

    fn image() -> SourceImage {
        SourceImage {
            width: 8,
            height: 8,
            rgba: vec![0; 8 * 8 * 4],
        }
    }

    #[tokio::test]
    async fn test_compile_passes_through_outcome() {
        let service = CompilerService::new(Arc::new(InstantCompiler), Duration::from_secs(5));
        let outcome = service
            .compile(image(), arforge_core::noop_progress(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, CompileOutcome::Compiled(_)));
    }

    #[tokio::test]
    async fn test_rejection_is_distinct_from_error() {
        let service = CompilerService::new(Arc::new(RejectingCompiler), Duration::from_secs(5));
        let outcome = service
            .compile(image(), arforge_core::noop_progress(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, CompileOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_hung_capability_hits_deadline() {
        let service = CompilerService::new(Arc::new(HangingCompiler), Duration::from_millis(20));
        let err = service
            .compile(image(), arforge_core::noop_progress(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_compilation() {
        let service = CompilerService::new(Arc::new(HangingCompiler), Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = service
            .compile(image(), arforge_core::noop_progress(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::Cancelled));
    }
}
