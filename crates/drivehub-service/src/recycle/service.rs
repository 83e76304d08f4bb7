//! Soft-delete policy layered on the node store.
//!
//! Binning stamps a whole subtree with one `binned_at`. That timestamp is
//! the batch key: restoring a node brings back exactly the nodes binned
//! together with it, and leaves alone anything below it that had been
//! binned earlier on its own.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use drivehub_core::config::BinConfig;
use drivehub_core::error::AppError;
use drivehub_core::types::NodeId;
use drivehub_database::store::NodeStore;
use drivehub_entity::node::Node;

use crate::context::RequestContext;
use crate::node::{DeleteReport, NodeService};

/// Maximum number of unreferenced content entries reaped per purge run.
const REAP_BATCH: u64 = 500;

/// Result of binning a node.
#[derive(Debug, Clone, Serialize)]
pub struct BinReport {
    /// The binned node.
    pub node: Node,
    /// Nodes newly marked binned (zero if it already was).
    pub binned: u64,
}

/// Result of restoring a node.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// The restored node.
    pub node: Node,
    /// Nodes returned to the live tree.
    pub restored: u64,
    /// Whether the node was placed at the root level because its former
    /// parent is binned or gone.
    pub reattached: bool,
}

/// Result of an expiry run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeReport {
    /// Expired bin entries processed.
    pub roots: u64,
    /// Aggregate deletion outcome.
    pub deleted: DeleteReport,
    /// Pending content entries released by the reaper.
    pub content_reaped: u64,
}

/// Manages the recycle bin.
#[derive(Debug, Clone)]
pub struct BinService {
    /// Node store.
    nodes: Arc<dyn NodeStore>,
    /// Node service, for permanent deletion.
    node_service: Arc<NodeService>,
    /// How long binned nodes are kept.
    retention: Duration,
}

impl BinService {
    /// Creates a new bin service.
    pub fn new(nodes: Arc<dyn NodeStore>, node_service: Arc<NodeService>, config: &BinConfig) -> Self {
        Self {
            nodes,
            node_service,
            retention: Duration::days(i64::from(config.retention_days)),
        }
    }

    /// Moves a node and its subtree to the bin. Binning a binned node
    /// succeeds without changing anything.
    pub async fn bin(&self, ctx: &RequestContext, id: NodeId) -> Result<BinReport, AppError> {
        let node = self.node_service.get(ctx, id).await?;
        if node.is_binned {
            return Ok(BinReport { node, binned: 0 });
        }

        let outcome = self.nodes.bin_subtree(id, ctx.request_time).await?;
        info!(
            owner = %ctx.owner,
            node_id = %id,
            binned = outcome.binned,
            "Moved to bin"
        );
        Ok(BinReport {
            node: outcome.root,
            binned: outcome.binned,
        })
    }

    /// Brings a binned node and its batch back. Fails with `Conflict`
    /// if any of them would clash with a live sibling; nothing is
    /// restored in that case.
    pub async fn restore(
        &self,
        ctx: &RequestContext,
        id: NodeId,
    ) -> Result<RestoreReport, AppError> {
        self.node_service.get(ctx, id).await?;
        let outcome = self.nodes.restore_subtree(id, ctx.request_time).await?;
        if outcome.restored > 0 {
            info!(
                owner = %ctx.owner,
                node_id = %id,
                restored = outcome.restored,
                reattached = outcome.reattached,
                "Restored from bin"
            );
        }
        Ok(RestoreReport {
            node: outcome.root,
            restored: outcome.restored,
            reattached: outcome.reattached,
        })
    }

    /// Top-level bin entries, most recently binned first.
    pub async fn list_bin(&self, ctx: &RequestContext) -> Result<Vec<Node>, AppError> {
        let mut roots = self.nodes.bin_roots(Some(ctx.owner), None).await?;
        roots.sort_by(|a, b| b.binned_at.cmp(&a.binned_at).then_with(|| a.name.cmp(&b.name)));
        Ok(roots)
    }

    /// When a binned node becomes eligible for purging.
    pub fn expires_at(&self, node: &Node) -> Option<DateTime<Utc>> {
        node.binned_at.map(|at| at + self.retention)
    }

    /// Permanently deletes everything in the caller's bin.
    pub async fn empty_bin(&self, ctx: &RequestContext) -> Result<DeleteReport, AppError> {
        let mut report = DeleteReport::default();
        for root in self.nodes.bin_roots(Some(ctx.owner), None).await? {
            let part = self
                .node_service
                .delete_subtree(ctx, root.id, root.is_folder())
                .await;
            report.merge(part);
        }
        info!(
            owner = %ctx.owner,
            nodes = report.nodes_deleted,
            complete = report.is_complete(),
            "Bin emptied"
        );
        Ok(report)
    }

    /// Permanently deletes bin entries older than the retention window,
    /// across all owners, then reaps content left pending.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport, AppError> {
        let cutoff = now - self.retention;
        let mut report = PurgeReport::default();

        for root in self.nodes.bin_roots(None, Some(cutoff)).await? {
            let ctx = RequestContext {
                owner: root.owner,
                request_time: now,
            };
            let part = self
                .node_service
                .delete_subtree(&ctx, root.id, root.is_folder())
                .await;
            if let Some(err) = &part.error {
                warn!(node_id = %root.id, error = %err, "Expired bin entry not fully purged");
            }
            report.roots += 1;
            report.deleted.merge(part);
        }

        report.content_reaped = self.node_service.addresser.reap_unreferenced(REAP_BATCH).await?;
        if report.roots > 0 || report.content_reaped > 0 {
            info!(
                roots = report.roots,
                nodes = report.deleted.nodes_deleted,
                reaped = report.content_reaped,
                "Bin purge finished"
            );
        }
        Ok(report)
    }
}
