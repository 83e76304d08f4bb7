//! Share link queries.

use async_trait::async_trait;

use drivehub_core::result::AppResult;
use drivehub_core::types::OwnerId;
use drivehub_entity::share::SharedLink;

use super::PgStore;
use crate::error::map_sqlx;
use crate::store::ShareStore;

#[async_trait]
impl ShareStore for PgStore {
    async fn create_link(&self, link: SharedLink) -> AppResult<SharedLink> {
        let inserted = sqlx::query_as::<_, SharedLink>(
            "INSERT INTO shared_links (link_id, file_id, owner_id, is_active, views, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (file_id) DO NOTHING RETURNING *",
        )
        .bind(&link.link_id)
        .bind(link.file_id)
        .bind(link.owner)
        .bind(link.is_active)
        .bind(link.views)
        .bind(link.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to create share link", e))?;
        if let Some(link) = inserted {
            return Ok(link);
        }

        sqlx::query_as::<_, SharedLink>("SELECT * FROM shared_links WHERE file_id = $1")
            .bind(link.file_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to find share link", e))
    }

    async fn get_link(&self, link_id: &str) -> AppResult<Option<SharedLink>> {
        sqlx::query_as::<_, SharedLink>("SELECT * FROM shared_links WHERE link_id = $1")
            .bind(link_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to find share link", e))
    }

    async fn record_view(&self, link_id: &str) -> AppResult<Option<SharedLink>> {
        sqlx::query_as::<_, SharedLink>(
            "UPDATE shared_links SET views = views + 1 \
             WHERE link_id = $1 AND is_active RETURNING *",
        )
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to record share view", e))
    }

    async fn set_link_active(
        &self,
        link_id: &str,
        active: bool,
    ) -> AppResult<Option<SharedLink>> {
        sqlx::query_as::<_, SharedLink>(
            "UPDATE shared_links SET is_active = $2 WHERE link_id = $1 RETURNING *",
        )
        .bind(link_id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to update share link", e))
    }

    async fn links_for_owner(&self, owner: OwnerId) -> AppResult<Vec<SharedLink>> {
        sqlx::query_as::<_, SharedLink>(
            "SELECT * FROM shared_links WHERE owner_id = $1 \
             ORDER BY created_at DESC, link_id ASC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to list share links", e))
    }
}
