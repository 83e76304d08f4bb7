//! Transfer job queries.

use async_trait::async_trait;

use drivehub_core::result::AppResult;
use drivehub_core::types::{JobId, OwnerId, PageRequest, PageResponse};
use drivehub_entity::job::{JobState, TransferJob};

use super::PgStore;
use super::rows::JobRow;
use crate::error::map_sqlx;
use crate::store::JobStore;

#[async_trait]
impl JobStore for PgStore {
    async fn save_job(&self, job: &TransferJob) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO transfer_jobs \
             (job_id, owner_id, kind, source, target_folder_id, state, file_name, result_node_id, \
              bytes_transferred, bytes_total, error, sequence, created_at, started_at, finished_at, \
              updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             ON CONFLICT (job_id) DO UPDATE SET \
                state = EXCLUDED.state, \
                file_name = EXCLUDED.file_name, \
                result_node_id = EXCLUDED.result_node_id, \
                bytes_transferred = EXCLUDED.bytes_transferred, \
                bytes_total = EXCLUDED.bytes_total, \
                error = EXCLUDED.error, \
                sequence = EXCLUDED.sequence, \
                started_at = EXCLUDED.started_at, \
                finished_at = EXCLUDED.finished_at, \
                updated_at = EXCLUDED.updated_at \
             WHERE transfer_jobs.sequence < EXCLUDED.sequence",
        )
        .bind(job.job_id)
        .bind(job.owner)
        .bind(job.kind)
        .bind(&job.source)
        .bind(job.target_folder_id)
        .bind(job.state)
        .bind(&job.file_name)
        .bind(job.result_node_id)
        .bind(job.bytes_transferred as i64)
        .bind(job.bytes_total.map(|t| t as i64))
        .bind(&job.error)
        .bind(job.sequence as i64)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to save job", e))?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> AppResult<Option<TransferJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM transfer_jobs WHERE job_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to find job", e))?;
        Ok(row.map(TransferJob::from))
    }

    async fn job_history(
        &self,
        owner: OwnerId,
        state: Option<JobState>,
        page: &PageRequest,
    ) -> AppResult<PageResponse<TransferJob>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transfer_jobs \
             WHERE owner_id = $1 AND ($2::job_state IS NULL OR state = $2)",
        )
        .bind(owner)
        .bind(state)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to count jobs", e))?;

        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM transfer_jobs \
             WHERE owner_id = $1 AND ($2::job_state IS NULL OR state = $2) \
             ORDER BY updated_at DESC, job_id DESC LIMIT $3 OFFSET $4",
        )
        .bind(owner)
        .bind(state)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to list jobs", e))?;

        Ok(PageResponse::new(
            rows.into_iter().map(TransferJob::from).collect(),
            page,
            total.max(0) as u64,
        ))
    }

    async fn unfinished_jobs(&self) -> AppResult<Vec<TransferJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM transfer_jobs WHERE state IN ('queued', 'running') \
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to list unfinished jobs", e))?;
        Ok(rows.into_iter().map(TransferJob::from).collect())
    }
}
