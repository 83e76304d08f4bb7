//! In-memory blob store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;
use drivehub_core::traits::blob::{BlobStore, ByteStream};

/// Blob store keeping content in a concurrent map.
///
/// It can be switched offline to exercise `StorageUnavailable` paths.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<DashMap<String, Bytes>>,
    online: Arc<AtomicBool>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self {
            blobs: Arc::new(DashMap::new()),
            online: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl MemoryBlobStore {
    /// Create an empty, online store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle availability.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Whether a blob exists under `locator`.
    pub fn contains(&self, locator: &str) -> bool {
        self.blobs.contains_key(locator)
    }

    fn ensure_online(&self) -> AppResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::storage_unavailable("Blob store is offline"))
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self.online.load(Ordering::SeqCst))
    }

    async fn put(&self, mut stream: ByteStream) -> AppResult<String> {
        self.ensure_online()?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| AppError::with_source(ErrorKind::Storage, "Stream read error", e))?;
            buf.extend_from_slice(&chunk);
        }
        let locator = format!("mem-{}", Uuid::new_v4().simple());
        self.blobs.insert(locator.clone(), buf.freeze());
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> AppResult<ByteStream> {
        self.ensure_online()?;
        let data = self
            .blobs
            .get(locator)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::not_found(format!("Blob not found: {locator}")))?;
        Ok(Box::pin(stream::iter(vec![Ok(data)])))
    }

    async fn delete(&self, locator: &str) -> AppResult<()> {
        self.ensure_online()?;
        self.blobs
            .remove(locator)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found(format!("Blob not found: {locator}")))
    }
}
