//! Node entity model.

use chrono::{DateTime, Utc};
use drivehub_core::types::{NodeId, OwnerId};
use serde::{Deserialize, Serialize};

/// Content attached to a file node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    /// Size of the content in bytes.
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the content.
    pub content_hash: String,
    /// Locator of the blob holding the content.
    pub blob_locator: String,
    /// MIME type reported at registration.
    pub mime_type: String,
}

/// What a node is. Folders carry nothing; their children point at them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKind {
    /// A folder.
    Folder,
    /// A file and its content reference.
    File(FileContent),
}

impl NodeKind {
    /// The kind as stored in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::File(_) => "file",
        }
    }
}

/// A file or folder in an owner's forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier.
    pub id: NodeId,
    /// The owning identity.
    pub owner: OwnerId,
    /// Parent folder (None for root-level nodes).
    pub parent_id: Option<NodeId>,
    /// Display name, case preserved.
    pub name: String,
    /// Folder or file payload.
    #[serde(flatten)]
    pub kind: NodeKind,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// When the node was last mutated.
    pub updated_at: DateTime<Utc>,
    /// Whether the node sits in the recycle bin.
    pub is_binned: bool,
    /// When the node was binned.
    pub binned_at: Option<DateTime<Utc>>,
    /// Whether the owner starred the node.
    pub is_starred: bool,
}

impl Node {
    /// Check if this is a root-level node (no parent).
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check if this node is a folder.
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder)
    }

    /// The file payload, if this node is a file.
    pub fn file(&self) -> Option<&FileContent> {
        match &self.kind {
            NodeKind::File(content) => Some(content),
            NodeKind::Folder => None,
        }
    }

    /// Size contributed by this node alone (zero for folders).
    pub fn size_bytes(&self) -> u64 {
        self.file().map_or(0, |c| c.size_bytes)
    }
}

/// Data required to insert a new node.
#[derive(Debug, Clone)]
pub struct NewNode {
    /// The owning identity.
    pub owner: OwnerId,
    /// Parent folder (None for root).
    pub parent_id: Option<NodeId>,
    /// Display name, already validated.
    pub name: String,
    /// Folder or file payload.
    pub kind: NodeKind,
}

impl NewNode {
    /// Materialise the node with a fresh id and timestamps.
    pub fn into_node(self, now: DateTime<Utc>) -> Node {
        Node {
            id: NodeId::new(),
            owner: self.owner,
            parent_id: self.parent_id,
            name: self.name,
            kind: self.kind,
            created_at: now,
            updated_at: now,
            is_binned: false,
            binned_at: None,
            is_starred: false,
        }
    }
}
