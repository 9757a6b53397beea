//! Production implementations of the orchestrator seams.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use arforge_core::{CapabilityGrant, Submission};
use arforge_db::{RecordError, SubmissionRepository};
use arforge_storage::{ProvisionError, Provisioner};

use crate::ports::{CapabilityIssuer, RecordStore};

#[async_trait]
impl RecordStore for SubmissionRepository {
    async fn create(
        &self,
        owner: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Submission, RecordError> {
        SubmissionRepository::create(self, owner, title, description).await
    }

    async fn set_asset_keys(
        &self,
        owner: &str,
        id: Uuid,
        image_key: &str,
        video_key: &str,
    ) -> Result<(), RecordError> {
        SubmissionRepository::set_asset_keys(self, owner, id, image_key, video_key).await
    }

    async fn mark_ready(&self, owner: &str, id: Uuid, marker_key: &str) -> Result<(), RecordError> {
        SubmissionRepository::mark_ready(self, owner, id, marker_key).await
    }

    async fn mark_error(&self, owner: &str, id: Uuid, detail: &str) -> Result<(), RecordError> {
        SubmissionRepository::mark_error(self, owner, id, detail).await
    }

    async fn mark_needs_better_source(&self, owner: &str, id: Uuid) -> Result<(), RecordError> {
        SubmissionRepository::mark_needs_better_source(self, owner, id).await
    }

    async fn delete(&self, owner: &str, id: Uuid) -> Result<bool, RecordError> {
        SubmissionRepository::delete(self, owner, id).await
    }
}

#[async_trait]
impl CapabilityIssuer for Provisioner {
    async fn grant_write(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<CapabilityGrant, ProvisionError> {
        Provisioner::grant_write(self, key, content_type, ttl).await
    }

    async fn grant_read(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<CapabilityGrant, ProvisionError> {
        Provisioner::grant_read(self, key, ttl).await
    }
}
