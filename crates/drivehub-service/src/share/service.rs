//! Share link generation and resolution.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::traits::blob::ByteStream;
use drivehub_core::types::NodeId;
use drivehub_database::store::ShareStore;
use drivehub_entity::node::Node;
use drivehub_entity::share::SharedLink;

use crate::context::RequestContext;
use crate::node::NodeService;

/// Manages public links to files.
#[derive(Debug, Clone)]
pub struct ShareService {
    links: Arc<dyn ShareStore>,
    nodes: Arc<NodeService>,
}

impl ShareService {
    /// Creates a new share service.
    pub fn new(links: Arc<dyn ShareStore>, nodes: Arc<NodeService>) -> Self {
        Self { links, nodes }
    }

    /// Returns the file's link, creating it on first use. A revoked link is
    /// reactivated rather than replaced.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        file_id: NodeId,
    ) -> Result<SharedLink, AppError> {
        let node = self.nodes.get_live(ctx, file_id).await?;
        if node.is_folder() {
            return Err(AppError::invalid_operation(format!(
                "'{}' is a folder and cannot be shared",
                node.name
            )));
        }

        let link = self
            .links
            .create_link(SharedLink::new(file_id, ctx.owner, Utc::now()))
            .await?;
        let link = if link.is_active {
            link
        } else {
            self.set_active(&link.link_id, true).await?
        };
        info!(
            owner = %ctx.owner,
            node_id = %file_id,
            link_id = %link.link_id,
            "Share link ready"
        );
        Ok(link)
    }

    /// Deactivates a link the caller owns.
    pub async fn revoke(&self, ctx: &RequestContext, link_id: &str) -> Result<SharedLink, AppError> {
        let link = self
            .links
            .get_link(link_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Share link {link_id} not found")))?;
        ctx.require_owner(link.owner)?;

        let link = self.set_active(link_id, false).await?;
        info!(owner = %ctx.owner, link_id = %link_id, "Share link revoked");
        Ok(link)
    }

    /// The caller's links, newest first.
    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<SharedLink>, AppError> {
        self.links.links_for_owner(ctx.owner).await
    }

    /// Opens the file behind an active link, for anyone holding the link.
    /// Each call counts as one view.
    pub async fn open(&self, link_id: &str) -> Result<(Node, ByteStream), AppError> {
        let link = self
            .links
            .record_view(link_id)
            .await?
            .ok_or_else(|| AppError::not_found("Link not found or expired"))?;

        let owner_ctx = RequestContext::new(link.owner);
        self.nodes
            .open_content(&owner_ctx, link.file_id)
            .await
            .map_err(|e| match e.kind {
                ErrorKind::NotFound => AppError::not_found("Original file has been deleted"),
                _ => e,
            })
    }

    async fn set_active(&self, link_id: &str, active: bool) -> Result<SharedLink, AppError> {
        self.links
            .set_link_active(link_id, active)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Share link {link_id} not found")))
    }
}
