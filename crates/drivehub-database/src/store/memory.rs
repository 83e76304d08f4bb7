//! In-process record store.
//!
//! All tables sit behind one `RwLock`, so every trait method is trivially
//! atomic. Sibling names are indexed the same way the PostgreSQL partial
//! unique index does it: `(owner, parent, lowercase(name))` over live nodes.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::types::{JobId, NodeId, OwnerId, PageRequest, PageResponse};
use drivehub_entity::content::ContentEntry;
use drivehub_entity::job::{JobState, TransferJob};
use drivehub_entity::node::{Node, NodeKind, normalize_name};
use drivehub_entity::share::SharedLink;

use super::{
    BinOutcome, ContentIndexStore, DeletedNode, FileInsert, FileInsertOutcome, JobStore,
    NodeStore, RestoreOutcome, ShareStore,
};

/// A sibling scope: children of one folder, or an owner's root level.
type Scope = (OwnerId, Option<NodeId>);

#[derive(Debug, Default)]
struct Tables {
    nodes: HashMap<NodeId, Node>,
    children: HashMap<Scope, BTreeSet<NodeId>>,
    live_names: HashMap<(Scope, String), NodeId>,
    content: HashMap<String, ContentEntry>,
    jobs: HashMap<JobId, TransferJob>,
    links: HashMap<String, SharedLink>,
}

impl Tables {
    fn node(&self, id: NodeId) -> AppResult<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))
    }

    fn live_node(&self, id: NodeId) -> AppResult<&Node> {
        match self.nodes.get(&id) {
            Some(node) if !node.is_binned => Ok(node),
            _ => Err(AppError::not_found(format!("Node {id} not found"))),
        }
    }

    fn is_live_folder(&self, owner: OwnerId, id: NodeId) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|p| p.owner == owner && p.is_folder() && !p.is_binned)
    }

    fn check_parent(&self, owner: OwnerId, parent: Option<NodeId>) -> AppResult<()> {
        match parent {
            Some(pid) if !self.is_live_folder(owner, pid) => {
                Err(AppError::not_found(format!("Folder {pid} not found")))
            }
            _ => Ok(()),
        }
    }

    fn check_name_free(&self, scope: Scope, name: &str, except: Option<NodeId>) -> AppResult<()> {
        match self.live_names.get(&(scope, normalize_name(name))) {
            Some(holder) if Some(*holder) != except => Err(AppError::conflict(format!(
                "An item named '{name}' already exists in this location"
            ))),
            _ => Ok(()),
        }
    }

    fn link(&mut self, node: Node) {
        let scope = (node.owner, node.parent_id);
        self.children.entry(scope).or_default().insert(node.id);
        if !node.is_binned {
            self.live_names
                .insert((scope, normalize_name(&node.name)), node.id);
        }
        self.nodes.insert(node.id, node);
    }

    fn unlink(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        let scope = (node.owner, node.parent_id);
        if let Some(set) = self.children.get_mut(&scope) {
            set.remove(&id);
            if set.is_empty() {
                self.children.remove(&scope);
            }
        }
        self.drop_live_name(&node);
        Some(node)
    }

    fn drop_live_name(&mut self, node: &Node) {
        let key = ((node.owner, node.parent_id), normalize_name(&node.name));
        if self.live_names.get(&key) == Some(&node.id) {
            self.live_names.remove(&key);
        }
    }

    fn child_ids(&self, owner: OwnerId, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children
            .get(&(owner, Some(parent)))
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// The node and all its descendants, root first.
    fn subtree(&self, root: &Node) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root.id];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.child_ids(root.owner, id));
        }
        out
    }
}

/// Record store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn get(&self, id: NodeId) -> AppResult<Option<Node>> {
        Ok(self.tables.read().await.nodes.get(&id).cloned())
    }

    async fn insert_folder(&self, node: Node) -> AppResult<Node> {
        if !node.is_folder() {
            return Err(AppError::invalid_operation("Expected a folder node"));
        }
        let mut t = self.tables.write().await;
        t.check_parent(node.owner, node.parent_id)?;
        t.check_name_free((node.owner, node.parent_id), &node.name, None)?;
        t.link(node.clone());
        Ok(node)
    }

    async fn insert_file(
        &self,
        mut node: Node,
        fresh_locator: Option<&str>,
    ) -> AppResult<FileInsertOutcome> {
        let NodeKind::File(mut file) = node.kind.clone() else {
            return Err(AppError::invalid_operation("Expected a file node"));
        };
        let mut t = self.tables.write().await;
        t.check_parent(node.owner, node.parent_id)?;
        t.check_name_free((node.owner, node.parent_id), &node.name, None)?;

        let (entry, deduplicated) = match t.content.get_mut(&file.content_hash) {
            Some(entry) if entry.is_live() => {
                entry.ref_count += 1;
                entry.updated_at = node.updated_at;
                (entry.clone(), true)
            }
            Some(entry) => return Ok(FileInsertOutcome::ContentPending(entry.clone())),
            None => {
                let Some(locator) = fresh_locator else {
                    return Ok(FileInsertOutcome::ContentMissing);
                };
                let entry = ContentEntry {
                    content_hash: file.content_hash.clone(),
                    blob_locator: locator.to_string(),
                    ref_count: 1,
                    size_bytes: file.size_bytes as i64,
                    created_at: node.created_at,
                    updated_at: node.created_at,
                };
                t.content.insert(entry.content_hash.clone(), entry.clone());
                (entry, false)
            }
        };

        file.blob_locator = entry.blob_locator.clone();
        node.kind = NodeKind::File(file);
        t.link(node.clone());
        Ok(FileInsertOutcome::Inserted(FileInsert {
            node,
            entry,
            deduplicated,
        }))
    }

    async fn rename(&self, id: NodeId, name: &str, now: DateTime<Utc>) -> AppResult<Node> {
        let mut t = self.tables.write().await;
        let mut node = t.node(id)?.clone();
        if !node.is_binned {
            t.check_name_free((node.owner, node.parent_id), name, Some(id))?;
        }
        t.unlink(id);
        node.name = name.to_string();
        node.updated_at = now;
        t.link(node.clone());
        Ok(node)
    }

    async fn move_to(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
        now: DateTime<Utc>,
        max_depth: usize,
    ) -> AppResult<Node> {
        let mut t = self.tables.write().await;
        let mut node = t.live_node(id)?.clone();

        let mut cursor = new_parent;
        let mut steps = 0usize;
        while let Some(current) = cursor {
            if current == id {
                return Err(AppError::invalid_operation(
                    "Cannot move a folder into itself or one of its descendants",
                ));
            }
            steps += 1;
            if steps > max_depth {
                return Err(AppError::internal(format!(
                    "Ancestry of {current} exceeds {max_depth} levels"
                )));
            }
            // Foreign chains are rejected by the parent check below.
            cursor = t
                .nodes
                .get(&current)
                .filter(|n| n.owner == node.owner)
                .and_then(|n| n.parent_id);
        }

        t.check_parent(node.owner, new_parent)?;
        if node.parent_id == new_parent {
            return Ok(node);
        }
        t.check_name_free((node.owner, new_parent), &node.name, None)?;

        t.unlink(id);
        node.parent_id = new_parent;
        node.updated_at = now;
        t.link(node.clone());
        Ok(node)
    }

    async fn set_starred(
        &self,
        id: NodeId,
        starred: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Node> {
        let mut t = self.tables.write().await;
        t.live_node(id)?;
        let node = t
            .nodes
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))?;
        node.is_starred = starred;
        node.updated_at = now;
        Ok(node.clone())
    }

    async fn bin_subtree(&self, id: NodeId, now: DateTime<Utc>) -> AppResult<BinOutcome> {
        let mut t = self.tables.write().await;
        let root = t.node(id)?.clone();
        let mut binned = 0u64;
        for nid in t.subtree(&root) {
            let Some(node) = t.nodes.get(&nid).cloned() else {
                continue;
            };
            if node.is_binned {
                continue;
            }
            t.drop_live_name(&node);
            if let Some(stored) = t.nodes.get_mut(&nid) {
                stored.is_binned = true;
                stored.binned_at = Some(now);
                stored.updated_at = now;
                binned += 1;
            }
        }
        let root = t.node(id)?.clone();
        Ok(BinOutcome { root, binned })
    }

    async fn restore_subtree(&self, id: NodeId, now: DateTime<Utc>) -> AppResult<RestoreOutcome> {
        let mut t = self.tables.write().await;
        let root = t.node(id)?.clone();
        if !root.is_binned {
            return Ok(RestoreOutcome {
                root,
                restored: 0,
                reattached: false,
            });
        }

        let batch = root.binned_at;
        let mut ids = Vec::new();
        let mut stack = vec![root.id];
        while let Some(nid) = stack.pop() {
            ids.push(nid);
            stack.extend(t.child_ids(root.owner, nid).filter(|child| {
                t.nodes
                    .get(child)
                    .is_some_and(|c| c.is_binned && c.binned_at == batch)
            }));
        }

        let destination = root
            .parent_id
            .filter(|pid| t.is_live_folder(root.owner, *pid));
        let reattached = root.parent_id.is_some() && destination.is_none();

        let mut claimed = HashSet::new();
        for nid in &ids {
            let node = t.node(*nid)?;
            let parent = if *nid == id { destination } else { node.parent_id };
            let key = ((node.owner, parent), normalize_name(&node.name));
            if t.live_names.contains_key(&key) || !claimed.insert(key) {
                return Err(AppError::conflict(format!(
                    "An item named '{}' already exists in the restore location",
                    node.name
                )));
            }
        }

        for nid in &ids {
            let Some(mut node) = t.unlink(*nid) else {
                continue;
            };
            if *nid == id {
                node.parent_id = destination;
            }
            node.is_binned = false;
            node.binned_at = None;
            node.updated_at = now;
            t.link(node);
        }

        let root = t.node(id)?.clone();
        Ok(RestoreOutcome {
            root,
            restored: ids.len() as u64,
            reattached,
        })
    }

    async fn delete_node(&self, id: NodeId) -> AppResult<Option<DeletedNode>> {
        let mut t = self.tables.write().await;
        let Some(node) = t.nodes.get(&id) else {
            return Ok(None);
        };
        if node.is_folder() && t.child_ids(node.owner, id).next().is_some() {
            return Err(AppError::conflict(format!(
                "Folder '{}' is not empty",
                node.name
            )));
        }

        let Some(node) = t.unlink(id) else {
            return Ok(None);
        };
        let mut released = None;
        if let Some(file) = node.file() {
            if let Some(entry) = t.content.get_mut(&file.content_hash) {
                if entry.ref_count > 0 {
                    entry.ref_count -= 1;
                    entry.updated_at = Utc::now();
                    if entry.ref_count == 0 {
                        released = Some(entry.clone());
                    }
                }
            }
        }
        Ok(Some(DeletedNode { node, released }))
    }

    async fn children(&self, owner: OwnerId, parent: Option<NodeId>) -> AppResult<Vec<Node>> {
        let t = self.tables.read().await;
        Ok(t.children
            .get(&(owner, parent))
            .into_iter()
            .flat_map(|set| set.iter())
            .filter_map(|id| t.nodes.get(id).cloned())
            .collect())
    }

    async fn search(&self, owner: OwnerId, needle: &str) -> AppResult<Vec<Node>> {
        let needle = needle.to_lowercase();
        let t = self.tables.read().await;
        Ok(t.nodes
            .values()
            .filter(|n| n.owner == owner && !n.is_binned)
            .filter(|n| n.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn starred(&self, owner: OwnerId) -> AppResult<Vec<Node>> {
        let t = self.tables.read().await;
        Ok(t.nodes
            .values()
            .filter(|n| n.owner == owner && n.is_starred && !n.is_binned)
            .cloned()
            .collect())
    }

    async fn bin_roots(
        &self,
        owner: Option<OwnerId>,
        binned_before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Node>> {
        let t = self.tables.read().await;
        Ok(t.nodes
            .values()
            .filter(|n| n.is_binned && owner.is_none_or(|o| n.owner == o))
            .filter(|n| match (binned_before, n.binned_at) {
                (Some(cutoff), Some(at)) => at < cutoff,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|n| {
                n.parent_id
                    .and_then(|pid| t.nodes.get(&pid))
                    .is_none_or(|parent| !parent.is_binned)
            })
            .cloned()
            .collect())
    }

    async fn count_for_owner(&self, owner: OwnerId) -> AppResult<u64> {
        let t = self.tables.read().await;
        Ok(t.nodes.values().filter(|n| n.owner == owner).count() as u64)
    }

    async fn usage_bytes(&self, owner: OwnerId) -> AppResult<u64> {
        let t = self.tables.read().await;
        Ok(t.nodes
            .values()
            .filter(|n| n.owner == owner)
            .map(Node::size_bytes)
            .sum())
    }
}

#[async_trait]
impl ContentIndexStore for MemoryStore {
    async fn get_entry(&self, content_hash: &str) -> AppResult<Option<ContentEntry>> {
        Ok(self.tables.read().await.content.get(content_hash).cloned())
    }

    async fn unreferenced(&self, limit: u64) -> AppResult<Vec<ContentEntry>> {
        let t = self.tables.read().await;
        let mut entries: Vec<ContentEntry> = t
            .content
            .values()
            .filter(|e| !e.is_live())
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.updated_at);
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn remove_unreferenced(
        &self,
        content_hash: &str,
        blob_locator: &str,
    ) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        match t.content.get(content_hash) {
            Some(entry) if !entry.is_live() && entry.blob_locator == blob_locator => {
                t.content.remove(content_hash);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn save_job(&self, job: &TransferJob) -> AppResult<()> {
        let mut t = self.tables.write().await;
        let stale = t
            .jobs
            .get(&job.job_id)
            .is_some_and(|stored| stored.sequence >= job.sequence);
        if !stale {
            t.jobs.insert(job.job_id, job.clone());
        }
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> AppResult<Option<TransferJob>> {
        Ok(self.tables.read().await.jobs.get(&id).cloned())
    }

    async fn job_history(
        &self,
        owner: OwnerId,
        state: Option<JobState>,
        page: &PageRequest,
    ) -> AppResult<PageResponse<TransferJob>> {
        let t = self.tables.read().await;
        let mut jobs: Vec<TransferJob> = t
            .jobs
            .values()
            .filter(|j| j.owner == owner && state.is_none_or(|s| j.state == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.job_id.cmp(&a.job_id))
        });
        Ok(PageResponse::from_sorted(jobs, page))
    }

    async fn unfinished_jobs(&self) -> AppResult<Vec<TransferJob>> {
        let t = self.tables.read().await;
        Ok(t.jobs
            .values()
            .filter(|j| !j.state.is_terminal())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ShareStore for MemoryStore {
    async fn create_link(&self, link: SharedLink) -> AppResult<SharedLink> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t.links.values().find(|l| l.file_id == link.file_id) {
            return Ok(existing.clone());
        }
        if t.links.contains_key(&link.link_id) {
            return Err(AppError::conflict(format!(
                "Link id {} is already taken",
                link.link_id
            )));
        }
        t.links.insert(link.link_id.clone(), link.clone());
        Ok(link)
    }

    async fn get_link(&self, link_id: &str) -> AppResult<Option<SharedLink>> {
        Ok(self.tables.read().await.links.get(link_id).cloned())
    }

    async fn record_view(&self, link_id: &str) -> AppResult<Option<SharedLink>> {
        let mut t = self.tables.write().await;
        Ok(t.links
            .get_mut(link_id)
            .filter(|l| l.is_active)
            .map(|l| {
                l.views += 1;
                l.clone()
            }))
    }

    async fn set_link_active(
        &self,
        link_id: &str,
        active: bool,
    ) -> AppResult<Option<SharedLink>> {
        let mut t = self.tables.write().await;
        Ok(t.links.get_mut(link_id).map(|l| {
            l.is_active = active;
            l.clone()
        }))
    }

    async fn links_for_owner(&self, owner: OwnerId) -> AppResult<Vec<SharedLink>> {
        let t = self.tables.read().await;
        let mut links: Vec<SharedLink> = t
            .links
            .values()
            .filter(|l| l.owner == owner)
            .cloned()
            .collect();
        links.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.link_id.cmp(&b.link_id))
        });
        Ok(links)
    }
}
