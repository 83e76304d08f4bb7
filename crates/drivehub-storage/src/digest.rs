//! SHA-256 content digests.

use futures::StreamExt;
use sha2::{Digest, Sha256};

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;
use drivehub_core::traits::blob::ByteStream;

/// Incremental SHA-256 hasher that also counts bytes.
#[derive(Clone, Default)]
pub struct ContentHasher {
    hasher: Sha256,
    size_bytes: u64,
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher")
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

impl ContentHasher {
    /// Create a fresh hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.size_bytes += chunk.len() as u64;
    }

    /// Bytes fed so far.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Finish and return `(lowercase hex digest, size)`.
    pub fn finalize(self) -> (String, u64) {
        (hex::encode(self.hasher.finalize()), self.size_bytes)
    }
}

/// Digest an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Drain a stream, returning its digest and length.
pub async fn digest_stream(mut stream: ByteStream) -> AppResult<(String, u64)> {
    let mut hasher = ContentHasher::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Stream read error", e))?;
        hasher.update(&chunk);
    }
    Ok(hasher.finalize())
}
