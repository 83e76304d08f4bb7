//! Local filesystem blob store.
//!
//! Blobs are written to `<root>/.incoming/` first and renamed into
//! `<root>/<xx>/<uuid>` once fully flushed, so a reader can never observe a
//! partial blob. The locator is the relative path `<xx>/<uuid>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;
use drivehub_core::traits::blob::{BlobStore, ByteStream};

const INCOMING_DIR: &str = ".incoming";

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `root_path`, creating the directory if needed.
    pub async fn new(root_path: impl AsRef<Path>) -> AppResult<Self> {
        let root = root_path.as_ref().to_path_buf();
        fs::create_dir_all(root.join(INCOMING_DIR))
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::StorageUnavailable,
                    format!("Failed to create blob root: {}", root.display()),
                    e,
                )
            })?;
        Ok(Self { root })
    }

    /// Resolve a locator to a path inside the root, rejecting anything that
    /// is not of the `<xx>/<uuid>` shape.
    fn resolve(&self, locator: &str) -> AppResult<PathBuf> {
        let mut parts = locator.split('/');
        let (Some(shard), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AppError::not_found(format!("Unknown blob locator: {locator}")));
        };
        let id = Uuid::parse_str(name)
            .map_err(|_| AppError::not_found(format!("Unknown blob locator: {locator}")))?;
        if shard != shard_of(&id) {
            return Err(AppError::not_found(format!("Unknown blob locator: {locator}")));
        }
        Ok(self.root.join(shard).join(name))
    }

    async fn write_incoming(&self, path: &Path, mut stream: ByteStream) -> AppResult<u64> {
        let mut file = fs::File::create(path).await.map_err(|e| {
            AppError::with_source(ErrorKind::StorageUnavailable, "Failed to create blob", e)
        })?;

        let mut total_bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| AppError::with_source(ErrorKind::Storage, "Stream read error", e))?;
            total_bytes += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(|e| {
                AppError::with_source(ErrorKind::StorageUnavailable, "Failed to write blob", e)
            })?;
        }
        file.sync_all().await.map_err(|e| {
            AppError::with_source(ErrorKind::StorageUnavailable, "Failed to flush blob", e)
        })?;
        Ok(total_bytes)
    }
}

/// A blob being written under `.incoming/`.
///
/// Removed on drop unless committed, which covers failed writes as well as
/// puts abandoned mid-stream by a caller timeout.
#[derive(Debug)]
struct IncomingBlob {
    path: PathBuf,
    committed: bool,
}

impl IncomingBlob {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for IncomingBlob {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove partial blob");
            }
        }
    }
}

fn shard_of(id: &Uuid) -> String {
    id.simple().to_string()[..2].to_string()
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn provider_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(fs::metadata(self.root.join(INCOMING_DIR))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn put(&self, stream: ByteStream) -> AppResult<String> {
        let id = Uuid::new_v4();
        let incoming = IncomingBlob::new(self.root.join(INCOMING_DIR).join(id.simple().to_string()));
        let total_bytes = self.write_incoming(incoming.path(), stream).await?;

        let shard = shard_of(&id);
        let final_dir = self.root.join(&shard);
        fs::create_dir_all(&final_dir).await.map_err(|e| {
            AppError::with_source(ErrorKind::StorageUnavailable, "Failed to create shard", e)
        })?;
        fs::rename(incoming.path(), final_dir.join(id.to_string()))
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::StorageUnavailable, "Failed to commit blob", e)
            })?;
        incoming.commit();

        let locator = format!("{shard}/{id}");
        debug!(locator, bytes = total_bytes, "Stored blob");
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> AppResult<ByteStream> {
        let path = self.resolve(locator)?;
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Blob not found: {locator}"))
            } else {
                AppError::with_source(
                    ErrorKind::StorageUnavailable,
                    format!("Failed to open blob: {locator}"),
                    e,
                )
            }
        })?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn delete(&self, locator: &str) -> AppResult<()> {
        let path = self.resolve(locator)?;
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Blob not found: {locator}"))
            } else {
                AppError::with_source(
                    ErrorKind::StorageUnavailable,
                    format!("Failed to delete blob: {locator}"),
                    e,
                )
            }
        })?;
        debug!(locator, "Deleted blob");
        Ok(())
    }
}
