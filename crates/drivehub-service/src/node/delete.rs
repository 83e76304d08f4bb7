//! Permanent, cascading deletion.
//!
//! Each node is removed by its own atomic store call, children before
//! parents, so an interrupted run leaves a smaller but still consistent
//! tree. Running the delete again on what is left finishes the job.

use serde::Serialize;
use tracing::{info, warn};

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::types::NodeId;

use super::service::NodeService;
use crate::context::RequestContext;

/// Outcome of a permanent delete.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    /// Nodes removed by this call.
    pub nodes_deleted: u64,
    /// Blobs deleted from the blob store by this call.
    pub blobs_released: u64,
    /// Unreferenced content whose blob could not be deleted yet; the
    /// reaper retries it.
    pub blobs_deferred: u64,
    /// Why the cascade stopped early, if it did.
    pub error: Option<String>,
    /// Kind of the error that stopped the cascade.
    pub error_kind: Option<ErrorKind>,
}

impl DeleteReport {
    /// Whether the whole subtree is gone.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Fold another report into this one, keeping the first error.
    pub fn merge(&mut self, other: DeleteReport) {
        self.nodes_deleted += other.nodes_deleted;
        self.blobs_released += other.blobs_released;
        self.blobs_deferred += other.blobs_deferred;
        if self.error.is_none() {
            self.error = other.error;
            self.error_kind = other.error_kind;
        }
    }

    fn stop(&mut self, err: &AppError) {
        self.error = Some(err.message.clone());
        self.error_kind = Some(err.kind);
    }
}

impl NodeService {
    /// Permanently deletes a node and, for folders, everything below it.
    ///
    /// A node that no longer exists is a no-op. If the cascade stops part
    /// way, the report carries the error and the call still succeeds; it
    /// fails only when nothing could be deleted.
    pub async fn permanent_delete(
        &self,
        ctx: &RequestContext,
        id: NodeId,
    ) -> Result<DeleteReport, AppError> {
        let Some(root) = self.nodes.get(id).await? else {
            return Ok(DeleteReport::default());
        };
        ctx.require_owner(root.owner)?;

        let report = self.delete_subtree(ctx, root.id, root.is_folder()).await;
        match (&report.error_kind, report.nodes_deleted) {
            (Some(kind), 0) => Err(AppError::new(
                *kind,
                report.error.clone().unwrap_or_default(),
            )),
            _ => {
                info!(
                    owner = %ctx.owner,
                    node_id = %id,
                    nodes = report.nodes_deleted,
                    blobs = report.blobs_released,
                    complete = report.is_complete(),
                    "Permanent delete finished"
                );
                Ok(report)
            }
        }
    }

    /// Post-order walk with an explicit stack. An entry is `(id, expanded)`;
    /// a folder is expanded once, pushing its children above itself.
    pub(crate) async fn delete_subtree(
        &self,
        ctx: &RequestContext,
        root: NodeId,
        root_is_folder: bool,
    ) -> DeleteReport {
        let mut report = DeleteReport::default();
        let mut stack = vec![(root, !root_is_folder)];

        while let Some((id, expanded)) = stack.pop() {
            if !expanded {
                let children = match self.nodes.children(ctx.owner, Some(id)).await {
                    Ok(children) => children,
                    Err(e) => {
                        report.stop(&e);
                        break;
                    }
                };
                stack.push((id, true));
                stack.extend(children.iter().map(|c| (c.id, !c.is_folder())));
                continue;
            }

            let deleted = match self.nodes.delete_node(id).await {
                Ok(Some(deleted)) => deleted,
                Ok(None) => continue,
                Err(e) => {
                    warn!(node_id = %id, error = %e, "Cascade delete stopped");
                    report.stop(&e);
                    break;
                }
            };
            report.nodes_deleted += 1;

            if let Some(entry) = deleted.released {
                match self.addresser.release(&entry).await {
                    Ok(true) => report.blobs_released += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            hash = %entry.content_hash,
                            error = %e,
                            "Blob release deferred"
                        );
                        report.blobs_deferred += 1;
                    }
                }
            }
        }
        report
    }
}
