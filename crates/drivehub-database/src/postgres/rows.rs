//! Row shapes that do not map one-to-one onto entities.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use drivehub_core::error::AppError;
use drivehub_core::types::{JobId, NodeId, OwnerId};
use drivehub_entity::job::{JobKind, JobState, TransferJob};
use drivehub_entity::node::{FileContent, Node, NodeKind};

#[derive(Debug, FromRow)]
pub(super) struct NodeRow {
    id: NodeId,
    owner_id: OwnerId,
    parent_id: Option<NodeId>,
    name: String,
    kind: String,
    size_bytes: Option<i64>,
    content_hash: Option<String>,
    blob_locator: Option<String>,
    mime_type: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    is_binned: bool,
    binned_at: Option<DateTime<Utc>>,
    is_starred: bool,
}

impl TryFrom<NodeRow> for Node {
    type Error = AppError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        let payload = (
            row.size_bytes,
            row.content_hash,
            row.blob_locator,
            row.mime_type,
        );
        let kind = match (row.kind.as_str(), payload) {
            ("folder", ..) => NodeKind::Folder,
            ("file", (Some(size), Some(hash), Some(locator), Some(mime))) => {
                NodeKind::File(FileContent {
                    size_bytes: u64::try_from(size).map_err(|_| {
                        AppError::internal(format!("Node {} has negative size", row.id))
                    })?,
                    content_hash: hash,
                    blob_locator: locator,
                    mime_type: mime,
                })
            }
            (other, ..) => {
                return Err(AppError::internal(format!(
                    "Node {} has malformed kind '{other}'",
                    row.id
                )));
            }
        };
        Ok(Node {
            id: row.id,
            owner: row.owner_id,
            parent_id: row.parent_id,
            name: row.name,
            kind,
            created_at: row.created_at,
            updated_at: row.updated_at,
            is_binned: row.is_binned,
            binned_at: row.binned_at,
            is_starred: row.is_starred,
        })
    }
}

pub(super) fn into_nodes(rows: Vec<NodeRow>) -> Result<Vec<Node>, AppError> {
    rows.into_iter().map(Node::try_from).collect()
}

#[derive(Debug, FromRow)]
pub(super) struct JobRow {
    job_id: JobId,
    owner_id: OwnerId,
    kind: JobKind,
    source: String,
    target_folder_id: Option<NodeId>,
    state: JobState,
    file_name: Option<String>,
    result_node_id: Option<NodeId>,
    bytes_transferred: i64,
    bytes_total: Option<i64>,
    error: Option<String>,
    sequence: i64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for TransferJob {
    fn from(row: JobRow) -> Self {
        Self {
            job_id: row.job_id,
            owner: row.owner_id,
            kind: row.kind,
            source: row.source,
            target_folder_id: row.target_folder_id,
            state: row.state,
            file_name: row.file_name,
            result_node_id: row.result_node_id,
            bytes_transferred: row.bytes_transferred.max(0) as u64,
            bytes_total: row.bytes_total.map(|t| t.max(0) as u64),
            error: row.error,
            sequence: row.sequence.max(0) as u64,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            updated_at: row.updated_at,
        }
    }
}
