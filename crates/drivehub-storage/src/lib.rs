//! # drivehub-storage
//!
//! Blob store implementations for DriveHub (local filesystem and in-memory),
//! a [`BlobManager`] that bounds every remote call with a timeout, SHA-256
//! content digests, and a staging area that spools downloads to disk while
//! hashing them.

pub mod digest;
pub mod manager;
pub mod providers;
pub mod staging;

pub use digest::ContentHasher;
pub use manager::BlobManager;
pub use staging::{StagedFile, StagingArea, StagingWriter};
