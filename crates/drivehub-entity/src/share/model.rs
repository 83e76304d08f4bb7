//! Share link model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use drivehub_core::types::{NodeId, OwnerId};

/// Length of a generated link id.
pub const LINK_ID_LEN: usize = 12;

/// A public link to one file. There is at most one link per file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SharedLink {
    /// Short opaque id used in the public URL.
    pub link_id: String,
    /// The shared file.
    pub file_id: NodeId,
    /// Owner of the file.
    #[sqlx(rename = "owner_id")]
    pub owner: OwnerId,
    /// Inactive links resolve to nothing.
    pub is_active: bool,
    /// Times the link has been opened.
    pub views: i64,
    /// When the link was generated.
    pub created_at: DateTime<Utc>,
}

impl SharedLink {
    /// A fresh, active link for `file_id`.
    pub fn new(file_id: NodeId, owner: OwnerId, now: DateTime<Utc>) -> Self {
        let mut link_id = Uuid::new_v4().simple().to_string();
        link_id.truncate(LINK_ID_LEN);
        Self {
            link_id,
            file_id,
            owner,
            is_active: true,
            views: 0,
            created_at: now,
        }
    }
}
