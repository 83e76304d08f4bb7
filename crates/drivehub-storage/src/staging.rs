//! Disk staging for incoming content.
//!
//! Downloads are spooled to a temporary file while their digest is computed,
//! so the content hash is known before anything reaches the blob store.
//! Staged files are removed when their handle is dropped.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;
use drivehub_core::traits::blob::ByteStream;

use crate::digest::ContentHasher;

/// A directory that holds in-flight staged files.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Use `dir` for staging, creating it if needed.
    pub async fn new(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create staging directory: {}", dir.display()),
                e,
            )
        })?;
        Ok(Self { dir })
    }

    /// Start a new staged file.
    pub async fn writer(&self) -> AppResult<StagingWriter> {
        let path = self.dir.join(format!("{}.part", Uuid::new_v4().simple()));
        let file = fs::File::create(&path).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to create staging file", e)
        })?;
        Ok(StagingWriter {
            path: Some(path),
            file,
            hasher: ContentHasher::new(),
        })
    }
}

/// Appends chunks to a staged file while hashing them.
#[derive(Debug)]
pub struct StagingWriter {
    path: Option<PathBuf>,
    file: fs::File,
    hasher: ContentHasher,
}

impl StagingWriter {
    /// Append a chunk.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> AppResult<()> {
        self.file.write_all(chunk).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to write staging file", e)
        })?;
        self.hasher.update(chunk);
        Ok(())
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.hasher.size_bytes()
    }

    /// Flush and seal the file.
    pub async fn finish(mut self) -> AppResult<StagedFile> {
        self.file.flush().await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to flush staging file", e)
        })?;
        let path = self
            .path
            .take()
            .ok_or_else(|| AppError::internal("Staging writer already finished"))?;
        let (content_hash, size_bytes) = std::mem::take(&mut self.hasher).finalize();
        debug!(path = %path.display(), size_bytes, "Staged content");
        Ok(StagedFile {
            path,
            size_bytes,
            content_hash,
        })
    }
}

impl Drop for StagingWriter {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// A fully written, hashed staged file.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    /// Content length.
    pub size_bytes: u64,
    /// Lowercase hex SHA-256.
    pub content_hash: String,
}

impl StagedFile {
    /// Open the staged content for reading.
    pub async fn open(&self) -> AppResult<ByteStream> {
        let file = fs::File::open(&self.path).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to reopen staging file", e)
        })?;
        Ok(Box::pin(ReaderStream::new(file)))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
