//! Feature compilation contract.
//!
//! A compiler turns decoded image pixels into a binary marker artifact usable
//! for AR tracking. The contract has three distinct outcomes: a compiled
//! artifact, a domain-level rejection (the image does not carry enough
//! distinguishing detail to track), and an execution error. Rejection is a
//! legitimate terminal outcome, not a failure, and callers must keep the two
//! apart.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use arforge_core::ProgressFn;

/// Decoded RGBA pixels of the submitted image.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

impl SourceImage {
    /// Decode an encoded image (PNG/JPEG/WebP) into pixels.
    pub fn decode(data: &[u8]) -> Result<Self, CompileError> {
        let decoded = image::load_from_memory(data)
            .map_err(|e| CompileError::Decode(e.to_string()))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Self {
            width,
            height,
            rgba: decoded.into_raw(),
        })
    }
}

/// Trivial manifest describing a compiled marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerManifest {
    pub feature_count: u32,
    pub source_width: u32,
    pub source_height: u32,
}

/// A compiled binary marker plus its manifest.
#[derive(Debug, Clone)]
pub struct MarkerArtifact {
    pub data: Vec<u8>,
    pub manifest: MarkerManifest,
}

/// Domain outcome of a compilation that executed to completion.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Compiled(MarkerArtifact),
    /// The source image has insufficient distinguishing detail. Maps to the
    /// `needs_better_source` status, never to `error`.
    Rejected { reason: String },
}

/// Failures of the compilation capability itself.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Failed to launch compiler: {0}")]
    Launch(String),

    #[error("Compiler execution failed: {0}")]
    Execution(String),

    #[error("Compilation exceeded the {limit:?} ceiling")]
    TimedOut { limit: Duration },

    #[error("Compilation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An opaque compilation capability.
///
/// Implementations report fractional progress through `on_progress` and must
/// distinguish rejection from execution failure. Timeout enforcement lives in
/// [`CompilerService`](crate::CompilerService), not in implementations.
#[async_trait]
pub trait FeatureCompiler: Send + Sync {
    async fn compile(
        &self,
        image: SourceImage,
        on_progress: ProgressFn,
    ) -> Result<CompileOutcome, CompileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_reports_dimensions() {
        let png = encode_png(64, 48);
        let source = SourceImage::decode(&png).unwrap();
        assert_eq!(source.width, 64);
        assert_eq!(source.height, 48);
        assert_eq!(source.rgba.len(), 64 * 48 * 4);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = SourceImage::decode(b"not an image").unwrap_err();
        assert!(matches!(err, CompileError::Decode(_)));
    }
}
