//! Content index entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Maps a content digest to the single blob holding those bytes.
///
/// An entry whose `ref_count` is zero is pending release: its blob is
/// about to be deleted and it must not be reused by new registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContentEntry {
    /// Lowercase hex SHA-256 of the content.
    pub content_hash: String,
    /// Locator returned by the blob store.
    pub blob_locator: String,
    /// Number of file nodes referencing this content.
    pub ref_count: i64,
    /// Content length in bytes.
    pub size_bytes: i64,
    /// When the entry was first created.
    pub created_at: DateTime<Utc>,
    /// When the reference count last changed.
    pub updated_at: DateTime<Utc>,
}

impl ContentEntry {
    /// Whether any live file still references this content.
    pub fn is_live(&self) -> bool {
        self.ref_count > 0
    }
}
