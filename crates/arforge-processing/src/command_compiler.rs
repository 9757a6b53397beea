//! Subprocess-backed marker compiler.
//!
//! Invokes a configured external compiler binary with
//! `--input <png> --output <marker>`. The tool reports `progress: N` lines on
//! stdout while running and a final `features: N` line on success. Exit code
//! 0 means a marker was produced; the dedicated rejection exit code means the
//! image was judged untrackable; any other exit is an execution failure.

use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use arforge_core::ProgressFn;

use crate::compiler::{
    CompileError, CompileOutcome, FeatureCompiler, MarkerArtifact, MarkerManifest, SourceImage,
};

/// Exit code the external tool uses for a quality rejection.
pub const REJECTED_EXIT_CODE: i32 = 3;

pub struct CommandCompiler {
    program: PathBuf,
}

impl CommandCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn encode_input(image: &SourceImage) -> Result<Vec<u8>, CompileError> {
        let buffer = image::RgbaImage::from_raw(image.width, image.height, image.rgba.clone())
            .ok_or_else(|| {
                CompileError::Decode("Pixel buffer does not match dimensions".to_string())
            })?;
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(buffer)
            .write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| CompileError::Decode(e.to_string()))?;
        Ok(out.into_inner())
    }
}

#[async_trait::async_trait]
impl FeatureCompiler for CommandCompiler {
    async fn compile(
        &self,
        image: SourceImage,
        on_progress: ProgressFn,
    ) -> Result<CompileOutcome, CompileError> {
        let dir = tempfile::tempdir()?;
        let input_path = dir.path().join("input.png");
        let output_path = dir.path().join("marker.mind");

        let encoded = Self::encode_input(&image)?;
        tokio::fs::write(&input_path, encoded).await?;

        let mut child = Command::new(&self.program)
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CompileError::Launch(format!("{}: {}", self.program.display(), e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CompileError::Launch("Compiler stdout unavailable".to_string()))?;

        let mut feature_count: Option<u32> = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim().to_string();
            if let Some(value) = line.strip_prefix("progress:") {
                if let Ok(percent) = value.trim().parse::<f32>() {
                    on_progress(percent.clamp(0.0, 100.0));
                }
            } else if let Some(value) = line.strip_prefix("features:") {
                feature_count = value.trim().parse::<u32>().ok();
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CompileError::Execution(e.to_string()))?;

        if output.status.code() == Some(REJECTED_EXIT_CODE) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = if stderr.trim().is_empty() {
                "Image has insufficient distinguishing features to track reliably".to_string()
            } else {
                stderr.trim().to_string()
            };
            tracing::info!(reason = %reason, "Compiler rejected source image");
            return Ok(CompileOutcome::Rejected { reason });
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompileError::Execution(format!(
                "Compiler exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let feature_count = feature_count.ok_or_else(|| {
            CompileError::Execution("Compiler did not report a feature count".to_string())
        })?;

        let data = tokio::fs::read(&output_path)
            .await
            .map_err(|e| CompileError::Execution(format!("Marker artifact unreadable: {}", e)))?;

        on_progress(100.0);

        Ok(CompileOutcome::Compiled(MarkerArtifact {
            data,
            manifest: MarkerManifest {
                feature_count,
                source_width: image.width,
                source_height: image.height,
            },
        }))
    }
}
