//! Collaborator seams of the orchestrator.
//!
//! The orchestrator is the sole writer of submission status, so the record
//! seam exposes exactly the guarded transitions plus the compensating delete.
//! Capability issuance is behind its own seam so tests can simulate transient
//! and permanent provisioning failures without a storage backend.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use arforge_core::{CapabilityGrant, Submission};
use arforge_db::RecordError;
use arforge_storage::ProvisionError;

/// Persistence seam for submission records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(
        &self,
        owner: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Submission, RecordError>;

    async fn set_asset_keys(
        &self,
        owner: &str,
        id: Uuid,
        image_key: &str,
        video_key: &str,
    ) -> Result<(), RecordError>;

    async fn mark_ready(&self, owner: &str, id: Uuid, marker_key: &str) -> Result<(), RecordError>;

    async fn mark_error(&self, owner: &str, id: Uuid, detail: &str) -> Result<(), RecordError>;

    async fn mark_needs_better_source(&self, owner: &str, id: Uuid) -> Result<(), RecordError>;

    async fn delete(&self, owner: &str, id: Uuid) -> Result<bool, RecordError>;
}

/// Capability issuance seam.
#[async_trait]
pub trait CapabilityIssuer: Send + Sync {
    async fn grant_write(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<CapabilityGrant, ProvisionError>;

    async fn grant_read(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<CapabilityGrant, ProvisionError>;
}
