use async_trait::async_trait;
use biblio_model::{Job, JobId, JobStatus, LibraryId};
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::error::{LibraryError, Result};
use crate::store::JobRepository;

#[derive(Clone, Debug)]
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_job(row: sqlx::postgres::PgRow) -> Job {
    Job {
        id: row.get::<uuid::Uuid, _>("id").into(),
        job_type: row.get("job_type"),
        status: row.get("status"),
        progress: row.get::<i32, _>("progress") as u8,
        library_id: row.get::<Option<uuid::Uuid>, _>("library_id").map(Into::into),
        process_id: row.get("process_id"),
        data: row.get("data"),
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    /// Admission gate: a global request (`library_id: None`) is blocked by
    /// any active scan; a library-scoped request is blocked by an active
    /// scan for the same library OR an active global scan.
    async fn has_active_scan(&self, library_id: Option<LibraryId>) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (
                SELECT 1 FROM jobs
                WHERE job_type = 'scan'
                  AND status IN ('pending', 'in_progress')
                  AND (library_id IS NULL OR $1 IS NULL OR library_id = $1)
            ) AS active",
        )
        .bind(library_id.map(|id| id.as_uuid()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LibraryError::Internal(format!("check active scan: {e}")))?;
        Ok(row.get("active"))
    }

    async fn enqueue_scan(&self, library_id: Option<LibraryId>) -> Result<Job> {
        if self.has_active_scan(library_id).await? {
            return Err(LibraryError::Conflict(
                "a scan is already pending or in progress for this library".into(),
            ));
        }

        let row = sqlx::query(
            "INSERT INTO jobs (id, job_type, status, progress, library_id, process_id, data) \
             VALUES ($1, 'scan', 'pending', 0, $2, NULL, '{}'::jsonb) \
             RETURNING id, job_type, status, progress, library_id, process_id, data",
        )
        .bind(uuid::Uuid::now_v7())
        .bind(library_id.map(|id| id.as_uuid()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LibraryError::Internal(format!("enqueue scan: {e}")))?;
        Ok(row_to_job(row))
    }

    /// Atomically picks the oldest pending scan and marks it in-progress
    /// under the calling process — `FOR UPDATE SKIP LOCKED` is what makes
    /// this safe with more than one driver polling the same table.
    async fn claim_oldest_pending_scan(&self, process_id: &str) -> Result<Option<Job>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LibraryError::Internal(format!("begin claim transaction: {e}")))?;

        let candidate = sqlx::query(
            "SELECT id FROM jobs WHERE job_type = 'scan' AND status = 'pending' \
             ORDER BY created_at ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| LibraryError::Internal(format!("select pending scan: {e}")))?;

        let Some(candidate) = candidate else {
            tx.commit().await.ok();
            return Ok(None);
        };
        let job_id: uuid::Uuid = candidate.get("id");

        let row = sqlx::query(
            "UPDATE jobs SET status = 'in_progress', process_id = $2, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, job_type, status, progress, library_id, process_id, data",
        )
        .bind(job_id)
        .bind(process_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| LibraryError::Internal(format!("claim scan: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| LibraryError::Internal(format!("commit claim transaction: {e}")))?;

        debug!(job_id = %job_id, process_id, "claimed pending scan");
        Ok(Some(row_to_job(row)))
    }

    async fn set_progress(&self, job_id: JobId, percent: u8) -> Result<()> {
        sqlx::query("UPDATE jobs SET progress = $2, updated_at = now() WHERE id = $1")
            .bind(job_id.as_uuid())
            .bind(percent as i32)
            .execute(&self.pool)
            .await
            .map_err(|e| LibraryError::Internal(format!("set job progress: {e}")))?;
        Ok(())
    }

    async fn complete(&self, job_id: JobId, status: JobStatus, data: serde_json::Value) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = $2, process_id = NULL, data = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(job_id.as_uuid())
        .bind(status)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| LibraryError::Internal(format!("complete job: {e}")))?;
        Ok(())
    }

    async fn request_cancel(&self, job_id: JobId) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET data = jsonb_set(coalesce(data, '{}'::jsonb), '{cancel_requested}', 'true') \
             WHERE id = $1",
        )
        .bind(job_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| LibraryError::Internal(format!("request job cancel: {e}")))?;
        Ok(())
    }

    async fn is_cancel_requested(&self, job_id: JobId) -> Result<bool> {
        let row = sqlx::query("SELECT data -> 'cancel_requested' AS flag FROM jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LibraryError::Internal(format!("read cancel flag: {e}")))?;

        Ok(row
            .and_then(|row| row.get::<Option<serde_json::Value>, _>("flag"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}

