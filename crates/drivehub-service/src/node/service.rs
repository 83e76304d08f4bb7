//! Node CRUD operations scoped to the acting owner.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use drivehub_core::config::TreeConfig;
use drivehub_core::error::AppError;
use drivehub_core::traits::blob::ByteStream;
use drivehub_core::types::{NodeId, PageRequest, PageResponse, format_bytes};
use drivehub_database::store::NodeStore;
use drivehub_entity::node::{
    FileContent, NewNode, Node, NodeKind, normalize_name, validate_name,
};
use drivehub_storage::StagedFile;

use crate::content::{ContentAddresser, ContentSource};
use crate::context::RequestContext;

/// MIME type used when none is known.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Manages structural mutation of an owner's forest.
#[derive(Debug, Clone)]
pub struct NodeService {
    /// Node store.
    pub(crate) nodes: Arc<dyn NodeStore>,
    /// Content addresser for file registration and release.
    pub(crate) addresser: Arc<ContentAddresser>,
    /// Ceiling on ancestry walks.
    max_depth: usize,
}

/// Request to register a file whose bytes are already in the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFileRequest {
    /// Parent folder (None for root-level).
    pub parent_id: Option<NodeId>,
    /// File name.
    pub name: String,
    /// Content length in bytes.
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the content.
    pub content_hash: String,
    /// Locator returned by the blob store.
    pub blob_locator: String,
    /// MIME type; empty means unknown.
    #[serde(default)]
    pub mime_type: String,
}

/// Filters for [`NodeService::list_children`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ListFilter {
    /// Only starred children.
    #[serde(default)]
    pub starred_only: bool,
    /// Include binned children.
    #[serde(default)]
    pub include_binned: bool,
}

/// Bytes an owner's files take up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    /// Sum of file sizes, binned files included.
    pub total_usage_bytes: u64,
    /// `total_usage_bytes` for display.
    pub total_usage_hr: String,
}

/// Search hits split by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    /// Matching folders, by name.
    pub folders: Vec<Node>,
    /// Matching files, by name.
    pub files: Vec<Node>,
}

impl NodeService {
    /// Creates a new node service.
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        addresser: Arc<ContentAddresser>,
        tree: &TreeConfig,
    ) -> Self {
        Self {
            nodes,
            addresser,
            max_depth: tree.max_depth,
        }
    }

    /// Gets a node the caller owns, binned or not.
    pub async fn get(&self, ctx: &RequestContext, id: NodeId) -> Result<Node, AppError> {
        let node = self
            .nodes
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))?;
        ctx.require_owner(node.owner)?;
        Ok(node)
    }

    /// Gets a live node the caller owns.
    pub async fn get_live(&self, ctx: &RequestContext, id: NodeId) -> Result<Node, AppError> {
        let node = self.get(ctx, id).await?;
        if node.is_binned {
            return Err(AppError::not_found(format!("Node {id} is in the bin")));
        }
        Ok(node)
    }

    /// Creates a new folder.
    pub async fn create_folder(
        &self,
        ctx: &RequestContext,
        parent_id: Option<NodeId>,
        name: &str,
    ) -> Result<Node, AppError> {
        let name = validate_name(name)?;
        let node = NewNode {
            owner: ctx.owner,
            parent_id,
            name,
            kind: NodeKind::Folder,
        }
        .into_node(ctx.request_time);

        let node = self.nodes.insert_folder(node).await?;
        info!(
            owner = %ctx.owner,
            node_id = %node.id,
            name = %node.name,
            "Folder created"
        );
        Ok(node)
    }

    /// Registers a file whose bytes the caller already stored.
    ///
    /// If the content is already indexed, the existing blob is reused and
    /// the caller's blob is deleted.
    pub async fn register_file(
        &self,
        ctx: &RequestContext,
        req: RegisterFileRequest,
    ) -> Result<Node, AppError> {
        validate_hash(&req.content_hash)?;
        if req.blob_locator.is_empty() {
            return Err(AppError::validation("Blob locator must not be empty"));
        }
        let node = self.new_file(
            ctx,
            req.parent_id,
            &req.name,
            req.size_bytes,
            req.content_hash,
            req.mime_type,
        )?;

        let insert = self
            .addresser
            .attach(node, ContentSource::Stored(req.blob_locator))
            .await?;
        info!(
            owner = %ctx.owner,
            node_id = %insert.node.id,
            hash = %insert.entry.content_hash,
            refs = insert.entry.ref_count,
            deduplicated = insert.deduplicated,
            "File registered"
        );
        Ok(insert.node)
    }

    /// Registers a file from staged bytes, uploading them only when the
    /// content is not indexed yet.
    pub async fn register_staged(
        &self,
        ctx: &RequestContext,
        parent_id: Option<NodeId>,
        name: &str,
        staged: &StagedFile,
        mime_type: &str,
    ) -> Result<Node, AppError> {
        let node = self.new_file(
            ctx,
            parent_id,
            name,
            staged.size_bytes,
            staged.content_hash.clone(),
            mime_type.to_string(),
        )?;

        let insert = self
            .addresser
            .attach(node, ContentSource::Staged(staged))
            .await?;
        info!(
            owner = %ctx.owner,
            node_id = %insert.node.id,
            hash = %insert.entry.content_hash,
            deduplicated = insert.deduplicated,
            "Staged file registered"
        );
        Ok(insert.node)
    }

    /// Renames a node.
    pub async fn rename(
        &self,
        ctx: &RequestContext,
        id: NodeId,
        new_name: &str,
    ) -> Result<Node, AppError> {
        let name = validate_name(new_name)?;
        self.get(ctx, id).await?;
        let node = self.nodes.rename(id, &name, ctx.request_time).await?;
        info!(owner = %ctx.owner, node_id = %id, name = %node.name, "Node renamed");
        Ok(node)
    }

    /// Moves a node under a new parent (None for root-level).
    pub async fn move_node(
        &self,
        ctx: &RequestContext,
        id: NodeId,
        new_parent_id: Option<NodeId>,
    ) -> Result<Node, AppError> {
        if new_parent_id == Some(id) {
            return Err(AppError::invalid_operation("Cannot move a node into itself"));
        }
        self.get_live(ctx, id).await?;

        // No chain can be longer than the number of nodes the owner has.
        let owned = self.nodes.count_for_owner(ctx.owner).await?;
        let bound = (owned as usize).min(self.max_depth).max(1);

        let node = self
            .nodes
            .move_to(id, new_parent_id, ctx.request_time, bound)
            .await?;
        info!(
            owner = %ctx.owner,
            node_id = %id,
            parent_id = ?new_parent_id,
            "Node moved"
        );
        Ok(node)
    }

    /// Stars a node.
    pub async fn star(&self, ctx: &RequestContext, id: NodeId) -> Result<Node, AppError> {
        self.set_starred(ctx, id, true).await
    }

    /// Removes the star from a node.
    pub async fn unstar(&self, ctx: &RequestContext, id: NodeId) -> Result<Node, AppError> {
        self.set_starred(ctx, id, false).await
    }

    async fn set_starred(
        &self,
        ctx: &RequestContext,
        id: NodeId,
        starred: bool,
    ) -> Result<Node, AppError> {
        self.get_live(ctx, id).await?;
        self.nodes.set_starred(id, starred, ctx.request_time).await
    }

    /// Lists the children of a folder (or of the caller's root level),
    /// folders first, then by name.
    pub async fn list_children(
        &self,
        ctx: &RequestContext,
        parent_id: Option<NodeId>,
        filter: ListFilter,
        page: PageRequest,
    ) -> Result<PageResponse<Node>, AppError> {
        if let Some(pid) = parent_id {
            let parent = if filter.include_binned {
                self.get(ctx, pid).await?
            } else {
                self.get_live(ctx, pid).await?
            };
            if !parent.is_folder() {
                return Err(AppError::invalid_operation(format!(
                    "'{}' is not a folder",
                    parent.name
                )));
            }
        }

        let mut children: Vec<Node> = self
            .nodes
            .children(ctx.owner, parent_id)
            .await?
            .into_iter()
            .filter(|n| filter.include_binned || !n.is_binned)
            .filter(|n| !filter.starred_only || n.is_starred)
            .collect();
        sort_for_listing(&mut children);
        Ok(PageResponse::from_sorted(children, &page))
    }

    /// Lists the caller's starred live nodes, folders first.
    pub async fn list_starred(&self, ctx: &RequestContext) -> Result<Vec<Node>, AppError> {
        let mut nodes = self.nodes.starred(ctx.owner).await?;
        sort_for_listing(&mut nodes);
        Ok(nodes)
    }

    /// Case-insensitive substring search over live node names.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> Result<SearchResults, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResults::default());
        }

        let mut hits = self.nodes.search(ctx.owner, query).await?;
        sort_for_listing(&mut hits);
        let (folders, files) = hits.into_iter().partition(Node::is_folder);
        Ok(SearchResults { folders, files })
    }

    /// Storage used by the caller's files. Binned files count until they
    /// are purged.
    pub async fn storage_usage(&self, ctx: &RequestContext) -> Result<StorageUsage, AppError> {
        let total = self.nodes.usage_bytes(ctx.owner).await?;
        Ok(StorageUsage {
            total_usage_bytes: total,
            total_usage_hr: format_bytes(total),
        })
    }

    /// Total size of the live files below a folder.
    pub async fn folder_size(&self, ctx: &RequestContext, id: NodeId) -> Result<u64, AppError> {
        let root = self.get_live(ctx, id).await?;
        if !root.is_folder() {
            return Ok(root.size_bytes());
        }

        let mut total = 0u64;
        let mut pending = vec![root.id];
        while let Some(folder) = pending.pop() {
            for child in self.nodes.children(ctx.owner, Some(folder)).await? {
                if child.is_binned {
                    continue;
                }
                if child.is_folder() {
                    pending.push(child.id);
                } else {
                    total += child.size_bytes();
                }
            }
        }
        Ok(total)
    }

    /// Opens the content of a live file.
    pub async fn open_content(
        &self,
        ctx: &RequestContext,
        id: NodeId,
    ) -> Result<(Node, ByteStream), AppError> {
        let node = self.get_live(ctx, id).await?;
        let Some(content) = node.file() else {
            return Err(AppError::invalid_operation(format!(
                "'{}' is a folder",
                node.name
            )));
        };
        let stream = self.addresser.open(&content.blob_locator).await?;
        Ok((node, stream))
    }

    /// Picks a name free among the live children of `parent_id`, appending
    /// ` (n)` before the extension when `desired` is taken.
    pub async fn available_name(
        &self,
        ctx: &RequestContext,
        parent_id: Option<NodeId>,
        desired: &str,
    ) -> Result<String, AppError> {
        let desired = validate_name(desired)?;
        let taken: HashSet<String> = self
            .nodes
            .children(ctx.owner, parent_id)
            .await?
            .iter()
            .filter(|n| !n.is_binned)
            .map(|n| normalize_name(&n.name))
            .collect();

        if !taken.contains(&normalize_name(&desired)) {
            return Ok(desired);
        }

        let (stem, ext) = split_extension(&desired);
        let mut n = 1u64;
        loop {
            let candidate = format!("{stem} ({n}){ext}");
            if !taken.contains(&normalize_name(&candidate)) {
                return validate_name(&candidate);
            }
            n += 1;
        }
    }

    fn new_file(
        &self,
        ctx: &RequestContext,
        parent_id: Option<NodeId>,
        name: &str,
        size_bytes: u64,
        content_hash: String,
        mime_type: String,
    ) -> Result<Node, AppError> {
        let name = validate_name(name)?;
        let mime_type = if mime_type.trim().is_empty() {
            DEFAULT_MIME_TYPE.to_string()
        } else {
            mime_type
        };
        Ok(NewNode {
            owner: ctx.owner,
            parent_id,
            name,
            kind: NodeKind::File(FileContent {
                size_bytes,
                content_hash,
                blob_locator: String::new(),
                mime_type,
            }),
        }
        .into_node(ctx.request_time))
    }
}

/// Folders first, then case-insensitive name.
pub(crate) fn sort_for_listing(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| {
        b.is_folder()
            .cmp(&a.is_folder())
            .then_with(|| normalize_name(&a.name).cmp(&normalize_name(&b.name)))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn validate_hash(hash: &str) -> Result<(), AppError> {
    let ok = hash.len() == 64 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if ok {
        Ok(())
    } else {
        Err(AppError::validation(
            "Content hash must be a lowercase hex SHA-256 digest",
        ))
    }
}

/// Split `report.final.pdf` into `("report.final", ".pdf")`. Dotfiles and
/// names without a dot have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}
