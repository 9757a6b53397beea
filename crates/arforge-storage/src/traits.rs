//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must
//! implement. The pipeline never holds ambient storage credentials on the
//! client side; it only consumes signed URLs issued through this trait.

use arforge_core::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Signed URLs not supported: {0}")]
    SigningUnsupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) must implement this trait.
/// Direct `put`/`get` are used by server-side components and tooling; the
/// client-side pipeline goes through `signed_put_url`/`signed_get_url` only.
///
/// **Key format:** `{owner}/{submission_id}/{asset}.{ext}`. See the crate
/// root documentation.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store an object at the given key.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Fetch an object by key.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Delete an object by key.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Whether an object exists at the key.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Generate a time-limited URL authorizing one GET of the object.
    async fn signed_get_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Generate a time-limited URL authorizing one PUT to the key.
    ///
    /// Only supported by S3 backends; other backends return
    /// `SigningUnsupported`.
    async fn signed_put_url(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
