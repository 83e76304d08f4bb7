//! # drivehub-entity
//!
//! Domain entity models for DriveHub: file/folder nodes, content index
//! entries, share links and background transfer jobs. Persisted entities
//! derive `Serialize`/`Deserialize`; those whose columns map one-to-one also
//! derive `sqlx::FromRow`.

pub mod content;
pub mod job;
pub mod node;
pub mod share;
