//! Structural operations on file and folder nodes.

pub mod delete;
pub mod service;

pub use delete::DeleteReport;
pub use service::{
    DEFAULT_MIME_TYPE, ListFilter, NodeService, RegisterFileRequest, SearchResults, StorageUsage,
};
