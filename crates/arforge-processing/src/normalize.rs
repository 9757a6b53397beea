//! Conditional video normalization.
//!
//! Before upload, a submitted video is probed and, when its container/codec
//! is not baseline-compatible, re-encoded to baseline H.264 MP4. A video that
//! is already compatible passes through untouched.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

use arforge_core::ProgressFn;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Video probe failed: {0}")]
    Probe(String),

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Failed to launch tool: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of normalizing one video.
#[derive(Debug, Clone)]
pub struct NormalizedVideo {
    pub data: Vec<u8>,
    /// Container extension of the normalized bytes.
    pub extension: String,
    pub reencoded: bool,
}

/// An opaque transcoding capability.
#[async_trait]
pub trait VideoNormalizer: Send + Sync {
    async fn normalize(
        &self,
        data: Vec<u8>,
        extension: &str,
        on_progress: ProgressFn,
    ) -> Result<NormalizedVideo, NormalizeError>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    profile: Option<String>,
}

fn is_baseline_compatible(extension: &str, stream: &FfprobeStream) -> bool {
    if extension != "mp4" {
        return false;
    }
    let codec_ok = stream.codec_name.as_deref() == Some("h264");
    let profile_ok = matches!(
        stream.profile.as_deref(),
        Some("Baseline") | Some("Constrained Baseline")
    );
    codec_ok && profile_ok
}

/// FFmpeg-backed normalizer.
pub struct FfmpegNormalizer {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegNormalizer {
    pub fn new(ffmpeg_path: String, ffprobe_path: String) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
        }
    }

    async fn probe(&self, input: &Path) -> Result<FfprobeStream, NormalizeError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=codec_name,profile",
                "-of",
                "json",
            ])
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| NormalizeError::Launch(format!("{}: {}", self.ffprobe_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NormalizeError::Probe(stderr.trim().to_string()));
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| NormalizeError::Probe(format!("Unparseable probe output: {}", e)))?;
        parsed
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| NormalizeError::Probe("No video stream found".to_string()))
    }

    async fn transcode(&self, input: &Path, output_path: &Path) -> Result<(), NormalizeError> {
        let output = Command::new(&self.ffmpeg_path)
            .arg("-i")
            .arg(input)
            .args([
                "-c:v",
                "libx264",
                "-profile:v",
                "baseline",
                "-level",
                "3.0",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-movflags",
                "+faststart",
                "-y",
            ])
            .arg(output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| NormalizeError::Launch(format!("{}: {}", self.ffmpeg_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NormalizeError::Transcode(stderr.trim().to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoNormalizer for FfmpegNormalizer {
    async fn normalize(
        &self,
        data: Vec<u8>,
        extension: &str,
        on_progress: ProgressFn,
    ) -> Result<NormalizedVideo, NormalizeError> {
        let dir = tempfile::tempdir()?;
        let input_path = dir.path().join(format!("input.{}", extension));
        tokio::fs::write(&input_path, &data).await?;

        let stream = self.probe(&input_path).await?;
        on_progress(10.0);

        if is_baseline_compatible(extension, &stream) {
            tracing::debug!(codec = ?stream.codec_name, "Video already baseline compatible");
            on_progress(100.0);
            return Ok(NormalizedVideo {
                data,
                extension: extension.to_string(),
                reencoded: false,
            });
        }

        tracing::info!(
            codec = ?stream.codec_name,
            profile = ?stream.profile,
            container = %extension,
            "Re-encoding video to baseline MP4"
        );

        let output_path = dir.path().join("normalized.mp4");
        self.transcode(&input_path, &output_path).await?;
        on_progress(90.0);

        let data = tokio::fs::read(&output_path).await?;
        on_progress(100.0);

        Ok(NormalizedVideo {
            data,
            extension: "mp4".to_string(),
            reencoded: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(codec: Option<&str>, profile: Option<&str>) -> FfprobeStream {
        FfprobeStream {
            codec_name: codec.map(String::from),
            profile: profile.map(String::from),
        }
    }

    #[test]
    fn test_baseline_mp4_passes_through() {
        assert!(is_baseline_compatible(
            "mp4",
            &stream(Some("h264"), Some("Constrained Baseline"))
        ));
        assert!(is_baseline_compatible(
            "mp4",
            &stream(Some("h264"), Some("Baseline"))
        ));
    }

    #[test]
    fn test_high_profile_or_foreign_container_requires_reencode() {
        assert!(!is_baseline_compatible(
            "mp4",
            &stream(Some("h264"), Some("High"))
        ));
        assert!(!is_baseline_compatible(
            "mkv",
            &stream(Some("h264"), Some("Baseline"))
        ));
        assert!(!is_baseline_compatible("mp4", &stream(Some("vp9"), None)));
    }

    #[test]
    fn test_probe_output_parsing() {
        let json = r#"{"streams":[{"codec_name":"h264","profile":"High"}]}"#;
        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.streams[0].codec_name.as_deref(), Some("h264"));
        assert_eq!(parsed.streams[0].profile.as_deref(), Some("High"));
    }
}
