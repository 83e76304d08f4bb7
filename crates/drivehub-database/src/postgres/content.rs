//! Content index queries.

use async_trait::async_trait;

use drivehub_core::result::AppResult;
use drivehub_entity::content::ContentEntry;

use super::PgStore;
use crate::error::map_sqlx;
use crate::store::ContentIndexStore;

#[async_trait]
impl ContentIndexStore for PgStore {
    async fn get_entry(&self, content_hash: &str) -> AppResult<Option<ContentEntry>> {
        sqlx::query_as::<_, ContentEntry>("SELECT * FROM content_index WHERE content_hash = $1")
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to find content entry", e))
    }

    async fn unreferenced(&self, limit: u64) -> AppResult<Vec<ContentEntry>> {
        sqlx::query_as::<_, ContentEntry>(
            "SELECT * FROM content_index WHERE ref_count = 0 ORDER BY updated_at ASC LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to list unreferenced content", e))
    }

    async fn remove_unreferenced(
        &self,
        content_hash: &str,
        blob_locator: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM content_index \
             WHERE content_hash = $1 AND blob_locator = $2 AND ref_count = 0",
        )
        .bind(content_hash)
        .bind(blob_locator)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to remove content entry", e))?;
        Ok(result.rows_affected() > 0)
    }
}
