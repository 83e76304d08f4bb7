//! Core type definitions used across the DriveHub workspace.

pub mod format;
pub mod id;
pub mod pagination;

pub use format::{format_bytes, format_eta};
pub use id::*;
pub use pagination::{PageRequest, PageResponse};
