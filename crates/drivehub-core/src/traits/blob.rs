//! Blob store trait for content-opaque byte storage backends.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::result::AppResult;

/// A byte stream type used for reading and writing blob contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Append-only storage for immutable content.
///
/// A blob is written once through [`put`](BlobStore::put), which returns an
/// opaque locator. The locator is the only handle to the content; the store
/// never interprets it beyond resolving it back to bytes. Implementations
/// live in `drivehub-storage`.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local", "memory").
    fn provider_type(&self) -> &str;

    /// Check whether the store is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Store the whole stream and return a stable locator for it.
    ///
    /// Fails with `StorageUnavailable` when the backend cannot accept
    /// writes. A failed put leaves no retrievable blob behind.
    async fn put(&self, stream: ByteStream) -> AppResult<String>;

    /// Open the content behind `locator` for reading.
    async fn get(&self, locator: &str) -> AppResult<ByteStream>;

    /// Remove the content behind `locator`.
    ///
    /// Fails with `NotFound` when nothing is stored under the locator.
    async fn delete(&self, locator: &str) -> AppResult<()>;
}
