//! Arforge Processing Library
//!
//! The opaque compute capabilities of the pipeline: marker compilation from
//! image pixels and conditional video normalization. Both are modeled as
//! traits so any implementation (native library, subprocess, remote service)
//! can satisfy them; the subprocess implementations here shell out to
//! configured external binaries.

pub mod command_compiler;
pub mod compiler;
pub mod normalize;
pub mod service;

pub use command_compiler::CommandCompiler;
pub use compiler::{
    CompileError, CompileOutcome, FeatureCompiler, MarkerArtifact, MarkerManifest, SourceImage,
};
pub use normalize::{FfmpegNormalizer, NormalizeError, NormalizedVideo, VideoNormalizer};
pub use service::CompilerService;
