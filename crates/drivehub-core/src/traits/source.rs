//! Remote content sources consumed by background transfers.

use async_trait::async_trait;

use super::blob::ByteStream;
use crate::result::AppResult;

/// An opened remote resource, ready to be consumed chunk by chunk.
pub struct RemoteContent {
    /// Declared length, when the source reports one.
    pub total_bytes: Option<u64>,
    /// Declared media type, without parameters.
    pub content_type: Option<String>,
    /// The body.
    pub stream: ByteStream,
}

impl std::fmt::Debug for RemoteContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteContent")
            .field("total_bytes", &self.total_bytes)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Something that can turn a source address into a byte stream.
#[async_trait]
pub trait RemoteSource: Send + Sync + std::fmt::Debug + 'static {
    /// Open `url` for reading. Connection failures surface here; failures
    /// while reading surface as stream items.
    async fn open(&self, url: &str) -> AppResult<RemoteContent>;
}
