//! Record store traits.
//!
//! Each method is one atomic check-and-write: either every precondition
//! holds and the whole write is applied, or nothing changes and an error
//! describes which precondition failed. Services compose these into the
//! user-facing operations.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use drivehub_core::result::AppResult;
use drivehub_core::types::{JobId, NodeId, OwnerId, PageRequest, PageResponse};
use drivehub_entity::content::ContentEntry;
use drivehub_entity::job::{JobState, TransferJob};
use drivehub_entity::node::Node;
use drivehub_entity::share::SharedLink;

pub use memory::MemoryStore;

/// A file node inserted together with its content reference.
#[derive(Debug, Clone)]
pub struct FileInsert {
    /// The stored node, pointing at the entry's blob.
    pub node: Node,
    /// The content entry after the reference was taken.
    pub entry: ContentEntry,
    /// Whether an existing live entry was reused.
    pub deduplicated: bool,
}

/// Result of [`NodeStore::insert_file`].
#[derive(Debug, Clone)]
pub enum FileInsertOutcome {
    /// The node was inserted and the content reference taken.
    Inserted(FileInsert),
    /// No live entry exists for the hash and no fresh blob was offered.
    ContentMissing,
    /// An entry exists but its blob is pending release; it must be released
    /// before the hash can be stored again.
    ContentPending(ContentEntry),
}

/// A node removed by [`NodeStore::delete_node`].
#[derive(Debug, Clone)]
pub struct DeletedNode {
    /// The removed node.
    pub node: Node,
    /// The content entry when this removal dropped its last reference.
    pub released: Option<ContentEntry>,
}

/// Result of [`NodeStore::bin_subtree`].
#[derive(Debug, Clone)]
pub struct BinOutcome {
    /// The subtree root after the operation.
    pub root: Node,
    /// Number of nodes newly marked binned.
    pub binned: u64,
}

/// Result of [`NodeStore::restore_subtree`].
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// The subtree root after the operation.
    pub root: Node,
    /// Number of nodes returned from the bin.
    pub restored: u64,
    /// Whether the root was moved to the owner's root level because its
    /// former parent is binned or gone.
    pub reattached: bool,
}

/// Durable file/folder nodes.
///
/// Sibling names are unique among non-binned nodes sharing
/// `(owner, parent_id)`, compared case-insensitively. A parent must be an
/// existing, non-binned folder with the same owner, otherwise the write
/// fails with `NotFound`.
#[async_trait]
pub trait NodeStore: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch a node by id.
    async fn get(&self, id: NodeId) -> AppResult<Option<Node>>;

    /// Insert a folder node.
    async fn insert_folder(&self, node: Node) -> AppResult<Node>;

    /// Insert a file node and take a reference on its content in the same
    /// transaction.
    ///
    /// A live entry for the hash is reused (its locator replaces the one on
    /// `node`). Otherwise `fresh_locator`, if given, becomes the locator of
    /// a new entry with one reference.
    async fn insert_file(
        &self,
        node: Node,
        fresh_locator: Option<&str>,
    ) -> AppResult<FileInsertOutcome>;

    /// Rename a node. Binned nodes may be renamed; live nodes are checked
    /// against their live siblings.
    async fn rename(&self, id: NodeId, name: &str, now: DateTime<Utc>) -> AppResult<Node>;

    /// Re-parent a live node.
    ///
    /// Fails with `InvalidOperation` if `new_parent` is the node or one of
    /// its descendants. The ancestry walk from `new_parent` follows at most
    /// `max_depth` links.
    async fn move_to(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
        now: DateTime<Utc>,
        max_depth: usize,
    ) -> AppResult<Node>;

    /// Set or clear the starred flag on a live node.
    async fn set_starred(&self, id: NodeId, starred: bool, now: DateTime<Utc>)
    -> AppResult<Node>;

    /// Mark a node and every descendant binned with the shared `now`.
    /// Nodes already binned keep their original `binned_at`.
    async fn bin_subtree(&self, id: NodeId, now: DateTime<Utc>) -> AppResult<BinOutcome>;

    /// Return a binned node and every descendant binned in the same
    /// operation to the live tree.
    ///
    /// Fails with `Conflict` if any restored node would collide with a live
    /// sibling; nothing is restored in that case.
    async fn restore_subtree(&self, id: NodeId, now: DateTime<Utc>) -> AppResult<RestoreOutcome>;

    /// Remove a single node, dropping a content reference for files.
    ///
    /// Returns `None` if the node is already gone. A folder that still has
    /// children is not removed and the call fails with `Conflict`.
    async fn delete_node(&self, id: NodeId) -> AppResult<Option<DeletedNode>>;

    /// All direct children of a folder (or of the owner's root), binned
    /// ones included.
    async fn children(&self, owner: OwnerId, parent: Option<NodeId>) -> AppResult<Vec<Node>>;

    /// Live nodes whose name contains `needle`, case-insensitively.
    async fn search(&self, owner: OwnerId, needle: &str) -> AppResult<Vec<Node>>;

    /// Live starred nodes.
    async fn starred(&self, owner: OwnerId) -> AppResult<Vec<Node>>;

    /// Binned nodes whose parent is absent or live, optionally limited to
    /// one owner and to nodes binned before a cutoff.
    async fn bin_roots(
        &self,
        owner: Option<OwnerId>,
        binned_before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Node>>;

    /// Number of nodes an owner has, binned ones included.
    async fn count_for_owner(&self, owner: OwnerId) -> AppResult<u64>;

    /// Sum of `size_bytes` over an owner's files, binned ones included.
    /// Deduplicated content counts once per file.
    async fn usage_bytes(&self, owner: OwnerId) -> AppResult<u64>;
}

/// The digest-to-blob index.
///
/// References are taken and dropped only through [`NodeStore`] so that the
/// count always matches the file nodes pointing at a hash.
#[async_trait]
pub trait ContentIndexStore: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch the entry for a hash.
    async fn get_entry(&self, content_hash: &str) -> AppResult<Option<ContentEntry>>;

    /// Entries with no references left, oldest first.
    async fn unreferenced(&self, limit: u64) -> AppResult<Vec<ContentEntry>>;

    /// Remove an entry if it is still unreferenced and still points at
    /// `blob_locator`. Returns whether a row was removed.
    async fn remove_unreferenced(&self, content_hash: &str, blob_locator: &str)
    -> AppResult<bool>;
}

/// Durable transfer job history.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert or update a job. A write carrying a `sequence` not newer than
    /// the stored one is ignored.
    async fn save_job(&self, job: &TransferJob) -> AppResult<()>;

    /// Fetch a job by id.
    async fn get_job(&self, id: JobId) -> AppResult<Option<TransferJob>>;

    /// An owner's jobs, most recently updated first.
    async fn job_history(
        &self,
        owner: OwnerId,
        state: Option<JobState>,
        page: &PageRequest,
    ) -> AppResult<PageResponse<TransferJob>>;

    /// Jobs that never reached a terminal state.
    async fn unfinished_jobs(&self) -> AppResult<Vec<TransferJob>>;
}

/// Public share links, at most one per file.
#[async_trait]
pub trait ShareStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert `link` unless its file already has one, returning whichever
    /// link the file ends up with.
    async fn create_link(&self, link: SharedLink) -> AppResult<SharedLink>;

    /// Fetch a link by id.
    async fn get_link(&self, link_id: &str) -> AppResult<Option<SharedLink>>;

    /// Count one view on an active link. Returns `None` if the link is
    /// missing or inactive.
    async fn record_view(&self, link_id: &str) -> AppResult<Option<SharedLink>>;

    /// Activate or deactivate a link.
    async fn set_link_active(&self, link_id: &str, active: bool)
    -> AppResult<Option<SharedLink>>;

    /// An owner's links, newest first.
    async fn links_for_owner(&self, owner: OwnerId) -> AppResult<Vec<SharedLink>>;
}
