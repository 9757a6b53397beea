//! Configuration module
//!
//! Environment-driven configuration for storage and the processing pipeline.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::time::Duration;

const MAX_IMAGE_SIZE_BYTES: usize = 25 * 1024 * 1024;
const MAX_VIDEO_SIZE_BYTES: usize = 500 * 1024 * 1024;
const COMPILE_TIMEOUT_SECS: u64 = 300;
const PROVISION_MAX_ATTEMPTS: u32 = 3;
const PROVISION_BASE_DELAY_MS: u64 = 200;
const UPLOAD_CHUNK_BYTES: usize = 256 * 1024;
const WRITE_GRANT_TTL_SECS: u64 = 15 * 60;
const READ_GRANT_TTL_SECS: u64 = 60 * 60;

/// Storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

/// Object storage configuration.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, Spaces, ...).
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "s3".to_string())
            .parse()?;

        Ok(Self {
            backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok().or(env::var("AWS_REGION").ok()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
        })
    }
}

/// Pipeline configuration: size ceilings, capability TTLs, retry policy
/// parameters, and transfer granularity.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub max_image_size_bytes: usize,
    pub max_video_size_bytes: usize,
    pub allowed_image_extensions: Vec<String>,
    pub allowed_video_extensions: Vec<String>,
    /// Hard ceiling for one marker compilation.
    pub compile_timeout: Duration,
    pub provision_max_attempts: u32,
    pub provision_base_delay: Duration,
    /// Transfer chunk size; also the cancellation-check granularity.
    pub upload_chunk_bytes: usize,
    pub write_grant_ttl: Duration,
    pub read_grant_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_image_size_bytes: MAX_IMAGE_SIZE_BYTES,
            max_video_size_bytes: MAX_VIDEO_SIZE_BYTES,
            allowed_image_extensions: vec!["png".into(), "jpg".into(), "jpeg".into(), "webp".into()],
            allowed_video_extensions: vec!["mp4".into(), "mov".into(), "webm".into(), "mkv".into()],
            compile_timeout: Duration::from_secs(COMPILE_TIMEOUT_SECS),
            provision_max_attempts: PROVISION_MAX_ATTEMPTS,
            provision_base_delay: Duration::from_millis(PROVISION_BASE_DELAY_MS),
            upload_chunk_bytes: UPLOAD_CHUNK_BYTES,
            write_grant_ttl: Duration::from_secs(WRITE_GRANT_TTL_SECS),
            read_grant_ttl: Duration::from_secs(READ_GRANT_TTL_SECS),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = env::var("MAX_IMAGE_SIZE_BYTES") {
            config.max_image_size_bytes = v.parse()?;
        }
        if let Ok(v) = env::var("MAX_VIDEO_SIZE_BYTES") {
            config.max_video_size_bytes = v.parse()?;
        }
        if let Ok(v) = env::var("COMPILE_TIMEOUT_SECS") {
            config.compile_timeout = Duration::from_secs(v.parse()?);
        }
        if let Ok(v) = env::var("PROVISION_MAX_ATTEMPTS") {
            config.provision_max_attempts = v.parse()?;
        }
        if let Ok(v) = env::var("PROVISION_BASE_DELAY_MS") {
            config.provision_base_delay = Duration::from_millis(v.parse()?);
        }
        if let Ok(v) = env::var("UPLOAD_CHUNK_BYTES") {
            config.upload_chunk_bytes = v.parse()?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_round_trip() {
        assert_eq!("s3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!(
            "Local".parse::<StorageBackend>().unwrap(),
            StorageBackend::Local
        );
        assert!("nfs".parse::<StorageBackend>().is_err());
        assert_eq!(StorageBackend::S3.to_string(), "s3");
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.provision_max_attempts, 3);
        assert!(config.read_grant_ttl >= config.write_grant_ttl);
        assert!(config.upload_chunk_bytes > 0);
    }
}
