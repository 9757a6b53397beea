//! Upload coordination: one asset transfer to a provisioned write capability.
//!
//! The transfer streams the payload in chunks so progress is reported at
//! sub-second granularity for large assets, and cancellation is observed at
//! every chunk boundary as well as while awaiting the response. There is no
//! internal retry: a half-completed large transfer must not be blindly
//! repeated, so the caller decides whether to re-provision and restart.

use bytes::Bytes;
use futures::stream;
use std::io;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use arforge_core::{CapabilityGrant, ProgressFn};

#[derive(Debug, Error)]
pub enum UploadError {
    /// The cancellation token fired mid-transfer. Distinct from `Error`
    /// outcomes; produces no error detail on the record.
    #[error("Upload cancelled")]
    Cancelled,

    /// The storage backend answered with a non-success status.
    #[error("Storage rejected upload with status {status}")]
    Storage { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl UploadError {
    /// Whether a re-provisioned, restarted transfer could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Cancelled => false,
            UploadError::Storage { status } => *status >= 500,
            UploadError::Transport(_) => true,
        }
    }
}

/// Transfers one asset's bytes to a previously issued write capability.
#[derive(Clone)]
pub struct UploadCoordinator {
    client: reqwest::Client,
    chunk_bytes: usize,
}

impl UploadCoordinator {
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    /// PUT `data` to the grant's signed URL.
    pub async fn upload(
        &self,
        data: Bytes,
        grant: &CapabilityGrant,
        content_type: &str,
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let total = data.len();
        let chunk = self.chunk_bytes;
        let stream_token = cancel.clone();
        let progress = on_progress.clone();

        let body = stream::unfold((data, 0usize), move |(buf, sent)| {
            let token = stream_token.clone();
            let progress = progress.clone();
            async move {
                if sent >= buf.len() {
                    return None;
                }
                if token.is_cancelled() {
                    let err = io::Error::new(io::ErrorKind::Interrupted, "upload cancelled");
                    return Some((Err(err), (buf, usize::MAX)));
                }
                let end = (sent + chunk).min(buf.len());
                let part = buf.slice(sent..end);
                progress(end as f32 * 100.0 / total as f32);
                Some((Ok(part), (buf, end)))
            }
        });

        let request = self
            .client
            .put(&grant.url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_LENGTH, total as u64)
            .body(reqwest::Body::wrap_stream(body));

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            result = request.send() => result,
        };

        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    on_progress(100.0);
                    tracing::debug!(key = %grant.key, size_bytes = total as u64, "Upload complete");
                    Ok(())
                } else {
                    Err(UploadError::Storage {
                        status: status.as_u16(),
                    })
                }
            }
            Err(_) if cancel.is_cancelled() => Err(UploadError::Cancelled),
            Err(e) => Err(UploadError::Transport(e.to_string())),
        }
    }
}
