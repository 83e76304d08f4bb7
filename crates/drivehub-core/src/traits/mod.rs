//! Traits for the engine's external collaborators, implemented by other
//! crates.

pub mod blob;
pub mod source;

pub use blob::{BlobStore, ByteStream};
pub use source::{RemoteContent, RemoteSource};
