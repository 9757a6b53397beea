//! Capability provisioning: retry-hardened signed-URL issuance.
//!
//! The storage control plane is allowed to hiccup; issuance is wrapped in a
//! bounded retry with increasing backoff. Only errors classified as transient
//! are retried. Permanent errors (not-found, invalid key, unsupported
//! backend, misconfiguration) surface immediately so a real failure is not
//! delayed by a wasted attempt budget.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use arforge_core::{CapabilityGrant, CapabilityOp};

use crate::traits::{Storage, StorageError};

/// Maximum backoff between issuance attempts. Caps exponential growth so a
/// high attempt ceiling does not produce excessively long delays.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Bounded retry policy for capability issuance.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Computes backoff before retry number `retry` (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff(policy: &RetryPolicy, retry: u32) -> Duration {
    let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
    policy
        .base_delay
        .saturating_mul(factor)
        .min(MAX_RETRY_BACKOFF)
}

/// Capability issuance errors.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Transient control-plane failure that survived the whole attempt budget.
    #[error("Capability issuance unavailable after {attempts} attempts: {detail}")]
    Unavailable { attempts: u32, detail: String },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Backend cannot issue this capability: {0}")]
    Unsupported(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl ProvisionError {
    /// Whether a fresh issuance attempt could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProvisionError::Unavailable { .. })
    }
}

/// Permanent errors map directly; everything else is worth retrying.
fn classify(err: StorageError) -> Result<String, ProvisionError> {
    match err {
        StorageError::NotFound(key) => Err(ProvisionError::NotFound(key)),
        StorageError::InvalidKey(msg) => Err(ProvisionError::InvalidKey(msg)),
        StorageError::SigningUnsupported(msg) => Err(ProvisionError::Unsupported(msg)),
        StorageError::ConfigError(msg) => Err(ProvisionError::Config(msg)),
        transient => Ok(transient.to_string()),
    }
}

/// Issues time-limited capability grants against a storage backend.
///
/// Grants are always derived fresh from the canonical key; nothing here is
/// cached or persisted.
#[derive(Clone)]
pub struct Provisioner {
    storage: Arc<dyn Storage>,
    policy: RetryPolicy,
}

impl Provisioner {
    pub fn new(storage: Arc<dyn Storage>, policy: RetryPolicy) -> Self {
        Self { storage, policy }
    }

    /// Issue a write capability for `key`.
    pub async fn grant_write(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<CapabilityGrant, ProvisionError> {
        self.issue(CapabilityOp::Write, key, content_type, ttl).await
    }

    /// Issue a read capability for `key`.
    pub async fn grant_read(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<CapabilityGrant, ProvisionError> {
        self.issue(CapabilityOp::Read, key, "", ttl).await
    }

    /// Derive a read URL for a recorded asset, degrading to the raw key.
    ///
    /// A listing of records must never hard-fail because one asset's URL
    /// could not be re-signed; the condition is logged as a warning and the
    /// caller receives the canonical key instead.
    pub async fn read_url_or_key(&self, key: &str, ttl: Duration) -> String {
        match self.grant_read(key, ttl).await {
            Ok(grant) => grant.url,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Read capability issuance failed, falling back to raw key"
                );
                key.to_string()
            }
        }
    }

    async fn issue(
        &self,
        operation: CapabilityOp,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<CapabilityGrant, ProvisionError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match operation {
                CapabilityOp::Read => self.storage.signed_get_url(key, ttl).await,
                CapabilityOp::Write => self.storage.signed_put_url(key, content_type, ttl).await,
            };

            match result {
                Ok(url) => {
                    let expires_at = Utc::now()
                        + chrono::Duration::from_std(ttl)
                            .unwrap_or_else(|_| chrono::Duration::hours(1));
                    return Ok(CapabilityGrant {
                        key: key.to_string(),
                        operation,
                        url,
                        expires_at,
                    });
                }
                Err(err) => {
                    let detail = classify(err)?;
                    if attempt >= max_attempts {
                        return Err(ProvisionError::Unavailable {
                            attempts: attempt,
                            detail,
                        });
                    }
                    let delay = compute_retry_backoff(&self.policy, attempt);
                    tracing::warn!(
                        key = %key,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %detail,
                        "Capability issuance failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StorageResult;
    use arforge_core::StorageBackend;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};

    enum SignBehavior {
        Ok,
        Transient,
        Permanent,
        /// Fail transiently for the first `n` calls, then succeed.
        FlakyUntil(u32),
    }

    struct FakeStorage {
        behavior: SignBehavior,
        calls: AtomicU32,
    }

    impl FakeStorage {
        fn new(behavior: SignBehavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn sign(&self, key: &str) -> StorageResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.behavior {
                SignBehavior::Ok => Ok(format!("https://signed.example/{}", key)),
                SignBehavior::Transient => {
                    Err(StorageError::BackendError("control plane 503".into()))
                }
                SignBehavior::Permanent => Err(StorageError::NotFound(key.to_string())),
                SignBehavior::FlakyUntil(n) => {
                    if call <= n {
                        Err(StorageError::BackendError("control plane 503".into()))
                    } else {
                        Ok(format!("https://signed.example/{}", key))
                    }
                }
            }
        }
    }

    #[async_trait]
    impl Storage for FakeStorage {
        async fn put(&self, _key: &str, _data: Bytes, _ct: &str) -> StorageResult<()> {
            Ok(())
        }
        async fn get(&self, key: &str) -> StorageResult<Bytes> {
            Err(StorageError::NotFound(key.to_string()))
        }
        async fn delete(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
        async fn exists(&self, _key: &str) -> StorageResult<bool> {
            Ok(true)
        }
        async fn signed_get_url(&self, key: &str, _ttl: Duration) -> StorageResult<String> {
            self.sign(key)
        }
        async fn signed_put_url(
            &self,
            key: &str,
            _ct: &str,
            _ttl: Duration,
        ) -> StorageResult<String> {
            self.sign(key)
        }
        fn backend_type(&self) -> StorageBackend {
            StorageBackend::Local
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_exhausts_attempt_ceiling() {
        let storage = FakeStorage::new(SignBehavior::Transient);
        let provisioner = Provisioner::new(storage.clone(), fast_policy());

        let err = provisioner
            .grant_write("alice/id/video.mp4", "video/mp4", Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(matches!(err, ProvisionError::Unavailable { attempts: 3, .. }));
        assert_eq!(storage.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_never_retried() {
        let storage = FakeStorage::new(SignBehavior::Permanent);
        let provisioner = Provisioner::new(storage.clone(), fast_policy());

        let err = provisioner
            .grant_read("alice/id/image.png", Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert!(matches!(err, ProvisionError::NotFound(_)));
        assert_eq!(storage.calls(), 1);
    }

    #[tokio::test]
    async fn test_recovers_within_attempt_budget() {
        let storage = FakeStorage::new(SignBehavior::FlakyUntil(2));
        let provisioner = Provisioner::new(storage.clone(), fast_policy());

        let grant = provisioner
            .grant_write("alice/id/image.png", "image/png", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(grant.operation, CapabilityOp::Write);
        assert_eq!(grant.key, "alice/id/image.png");
        assert_eq!(storage.calls(), 3);
    }

    #[tokio::test]
    async fn test_repeated_read_grants_resolve_same_object() {
        let storage = FakeStorage::new(SignBehavior::Ok);
        let provisioner = Provisioner::new(storage, fast_policy());
        let ttl = Duration::from_secs(3600);

        let a = provisioner.grant_read("alice/id/video.mp4", ttl).await.unwrap();
        let b = provisioner.grant_read("alice/id/video.mp4", ttl).await.unwrap();

        assert_eq!(a.key, b.key);
        assert!(a.url.contains("alice/id/video.mp4"));
        assert!(b.url.contains("alice/id/video.mp4"));
    }

    #[tokio::test]
    async fn test_read_url_falls_back_to_raw_key() {
        let storage = FakeStorage::new(SignBehavior::Transient);
        let provisioner = Provisioner::new(
            storage,
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
            },
        );

        let url = provisioner
            .read_url_or_key("alice/id/marker.mind", Duration::from_secs(60))
            .await;
        assert_eq!(url, "alice/id/marker.mind");
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(200),
        };
        assert_eq!(compute_retry_backoff(&policy, 1), Duration::from_millis(200));
        assert_eq!(compute_retry_backoff(&policy, 2), Duration::from_millis(400));
        assert_eq!(compute_retry_backoff(&policy, 3), Duration::from_millis(800));
        assert_eq!(compute_retry_backoff(&policy, 20), MAX_RETRY_BACKOFF);
    }
}
