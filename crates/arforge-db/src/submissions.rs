use sqlx::{PgPool, Row};
use uuid::Uuid;

use arforge_core::{Submission, SubmissionStatus};

/// Submission record persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Submission not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid status transition to {to} for submission {id}")]
    InvalidTransition { id: Uuid, to: SubmissionStatus },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for submission records.
#[derive(Clone)]
pub struct SubmissionRepository {
    pool: PgPool,
}

impl SubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a record in the initial `processing` state, before any asset
    /// exists.
    pub async fn create(
        &self,
        owner: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Submission, RecordError> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO submissions (id, owner, title, description, status)
            VALUES ($1, $2, $3, $4, 'processing')
            RETURNING created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(title)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(submission_id = %id, owner = %owner, "Submission record created");

        Ok(Submission {
            id,
            owner: owner.to_string(),
            title: title.to_string(),
            description: description.map(String::from),
            image_key: None,
            video_key: None,
            marker_key: None,
            status: SubmissionStatus::Processing,
            error_detail: None,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Get one record, scoped to its owner.
    pub async fn get(&self, owner: &str, id: Uuid) -> Result<Option<Submission>, RecordError> {
        let row = sqlx::query(
            r#"
            SELECT id, owner, title, description, image_key, video_key, marker_key,
                   status, error_detail, created_at, updated_at
            FROM submissions
            WHERE id = $1 AND owner = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.map(submission_from_row).transpose()
    }

    /// List an owner's records, newest first.
    pub async fn list_for_owner(
        &self,
        owner: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Submission>, RecordError> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner, title, description, image_key, video_key, marker_key,
                   status, error_detail, created_at, updated_at
            FROM submissions
            WHERE owner = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(submission_from_row).collect()
    }

    /// Record the canonical image and video locations derived from the id.
    pub async fn set_asset_keys(
        &self,
        owner: &str,
        id: Uuid,
        image_key: &str,
        video_key: &str,
    ) -> Result<(), RecordError> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET image_key = $3, video_key = $4, updated_at = NOW()
            WHERE id = $1 AND owner = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(image_key)
        .bind(video_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RecordError::NotFound(id));
        }
        Ok(())
    }

    /// `processing → ready`: both branches succeeded; the marker location is
    /// recorded in the same statement so a ready record always holds all
    /// three keys.
    pub async fn mark_ready(
        &self,
        owner: &str,
        id: Uuid,
        marker_key: &str,
    ) -> Result<(), RecordError> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET status = 'ready', marker_key = $3, error_detail = NULL, updated_at = NOW()
            WHERE id = $1 AND owner = $2 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(marker_key)
        .execute(&self.pool)
        .await?;

        self.check_transition(owner, id, SubmissionStatus::Ready, result.rows_affected())
            .await
    }

    /// `processing → error`, with a human-readable cause.
    pub async fn mark_error(
        &self,
        owner: &str,
        id: Uuid,
        error_detail: &str,
    ) -> Result<(), RecordError> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET status = 'error', error_detail = $3, updated_at = NOW()
            WHERE id = $1 AND owner = $2 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(error_detail)
        .execute(&self.pool)
        .await?;

        self.check_transition(owner, id, SubmissionStatus::Error, result.rows_affected())
            .await
    }

    /// `processing → needs_better_source`: the source image was rejected for
    /// insufficient detail. Not an error; `error_detail` stays empty.
    pub async fn mark_needs_better_source(&self, owner: &str, id: Uuid) -> Result<(), RecordError> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET status = 'needs_better_source', updated_at = NOW()
            WHERE id = $1 AND owner = $2 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;

        self.check_transition(
            owner,
            id,
            SubmissionStatus::NeedsBetterSource,
            result.rows_affected(),
        )
        .await
    }

    /// Compensating delete. Returns whether a record was removed.
    pub async fn delete(&self, owner: &str, id: Uuid) -> Result<bool, RecordError> {
        let result = sqlx::query("DELETE FROM submissions WHERE id = $1 AND owner = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(submission_id = %id, owner = %owner, "Submission record deleted");
        }
        Ok(deleted)
    }

    /// A zero-row guarded update means either the record is missing or it
    /// already left `processing`.
    async fn check_transition(
        &self,
        owner: &str,
        id: Uuid,
        to: SubmissionStatus,
        rows_affected: u64,
    ) -> Result<(), RecordError> {
        if rows_affected > 0 {
            tracing::info!(submission_id = %id, status = %to, "Submission status updated");
            return Ok(());
        }
        match self.get(owner, id).await? {
            Some(_) => Err(RecordError::InvalidTransition { id, to }),
            None => Err(RecordError::NotFound(id)),
        }
    }
}

fn submission_from_row(row: sqlx::postgres::PgRow) -> Result<Submission, RecordError> {
    let status: String = row.get("status");
    let status = status
        .parse::<SubmissionStatus>()
        .map_err(|e| sqlx::Error::Decode(format!("Failed to parse status: {}", e).into()))?;

    Ok(Submission {
        id: row.get("id"),
        owner: row.get("owner"),
        title: row.get("title"),
        description: row.get("description"),
        image_key: row.get("image_key"),
        video_key: row.get("video_key"),
        marker_key: row.get("marker_key"),
        status,
        error_detail: row.get("error_detail"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
