//! Digest-to-blob deduplication over the content index.
//!
//! A file node and the reference it takes on its content are written in
//! one store transaction, so the index count always equals the number of
//! file nodes pointing at a hash. Blob store calls happen outside that
//! transaction:
//!
//! - a blob is uploaded before its first reference exists, and deleted
//!   again if another upload of the same bytes won the race;
//! - a blob is deleted only after its entry reached zero references, and
//!   the entry row is removed only after the delete succeeded.
//!
//! An entry left at zero references (the process died between the two
//! steps, or the blob store was down) blocks new references to that hash
//! until [`ContentAddresser::release`] finishes the job.

use std::sync::Arc;

use tracing::{debug, info, warn};

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;
use drivehub_core::traits::blob::{BlobStore, ByteStream};
use drivehub_database::store::{ContentIndexStore, FileInsert, FileInsertOutcome, NodeStore};
use drivehub_entity::content::ContentEntry;
use drivehub_entity::node::Node;
use drivehub_storage::StagedFile;
use drivehub_storage::digest::digest_stream;

/// How many times an insert is retried after releasing a pending entry.
const MAX_INSERT_ATTEMPTS: usize = 4;

/// Where the bytes of a file being registered come from.
#[derive(Debug)]
pub enum ContentSource<'a> {
    /// The caller already stored the bytes and holds this locator.
    Stored(String),
    /// The bytes are staged locally and uploaded only when no live entry
    /// for their hash exists.
    Staged(&'a StagedFile),
}

/// Computes digests and maintains the digest-to-blob index.
#[derive(Debug, Clone)]
pub struct ContentAddresser {
    /// Node store, which owns reference taking and dropping.
    nodes: Arc<dyn NodeStore>,
    /// Content index.
    index: Arc<dyn ContentIndexStore>,
    /// Blob store.
    blobs: Arc<dyn BlobStore>,
}

impl ContentAddresser {
    /// Creates a new content addresser.
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        index: Arc<dyn ContentIndexStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            nodes,
            index,
            blobs,
        }
    }

    /// Digest a stream without storing it.
    pub async fn digest(&self, stream: ByteStream) -> AppResult<(String, u64)> {
        digest_stream(stream).await
    }

    /// The live entry for a hash, if any.
    pub async fn find_live(&self, content_hash: &str) -> AppResult<Option<ContentEntry>> {
        Ok(self
            .index
            .get_entry(content_hash)
            .await?
            .filter(ContentEntry::is_live))
    }

    /// Upload bytes to the blob store, returning the new locator.
    pub async fn store(&self, stream: ByteStream) -> AppResult<String> {
        self.blobs.put(stream).await
    }

    /// Open the blob behind a locator.
    pub async fn open(&self, blob_locator: &str) -> AppResult<ByteStream> {
        self.blobs.get(blob_locator).await
    }

    /// Insert `node` (a file node) and take a reference on its content.
    ///
    /// An existing live entry is reused and a caller-supplied blob that
    /// turned out redundant is deleted. A staged source is uploaded only if
    /// the hash is not stored yet; if the insert then fails, that upload is
    /// deleted again.
    pub async fn attach(&self, node: Node, source: ContentSource<'_>) -> AppResult<FileInsert> {
        let Some(content_hash) = node.file().map(|c| c.content_hash.clone()) else {
            return Err(AppError::invalid_operation("Only files carry content"));
        };

        let (mut fresh, mut uploaded) = match &source {
            ContentSource::Stored(locator) => (Some(locator.clone()), false),
            ContentSource::Staged(_) => (None, false),
        };

        for _ in 0..MAX_INSERT_ATTEMPTS {
            let outcome = match self.nodes.insert_file(node.clone(), fresh.as_deref()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    if uploaded {
                        self.discard(fresh.as_deref()).await;
                    }
                    return Err(e);
                }
            };

            match outcome {
                FileInsertOutcome::Inserted(insert) => {
                    if let Some(locator) = fresh.as_deref() {
                        if locator != insert.entry.blob_locator {
                            debug!(
                                hash = %content_hash,
                                redundant = %locator,
                                kept = %insert.entry.blob_locator,
                                "Discarding duplicate upload"
                            );
                            self.discard(Some(locator)).await;
                        }
                    }
                    return Ok(insert);
                }
                FileInsertOutcome::ContentMissing => {
                    let ContentSource::Staged(staged) = &source else {
                        return Err(AppError::internal(
                            "Content index reported missing content for a stored blob",
                        ));
                    };
                    fresh = Some(self.blobs.put(staged.open().await?).await?);
                    uploaded = true;
                }
                FileInsertOutcome::ContentPending(entry) => {
                    if !uploaded && fresh.as_deref() == Some(entry.blob_locator.as_str()) {
                        return Err(AppError::conflict(format!(
                            "Blob {} is being released",
                            entry.blob_locator
                        )));
                    }
                    info!(hash = %entry.content_hash, "Finishing pending content release");
                    if let Err(e) = self.release(&entry).await {
                        if uploaded {
                            self.discard(fresh.as_deref()).await;
                        }
                        return Err(e);
                    }
                }
            }
        }

        if uploaded {
            self.discard(fresh.as_deref()).await;
        }
        Err(AppError::conflict(format!(
            "Content {content_hash} kept changing while registering"
        )))
    }

    /// Delete the blob of an unreferenced entry, then drop the entry.
    ///
    /// Returns whether this call deleted the blob. A blob that is already
    /// gone counts as released but not as deleted here.
    pub async fn release(&self, entry: &ContentEntry) -> AppResult<bool> {
        if entry.is_live() {
            return Err(AppError::invalid_operation(format!(
                "Content {} is still referenced",
                entry.content_hash
            )));
        }

        let deleted = match self.blobs.delete(&entry.blob_locator).await {
            Ok(()) => true,
            Err(e) if e.kind == ErrorKind::NotFound => {
                debug!(locator = %entry.blob_locator, "Blob already gone");
                false
            }
            Err(e) => return Err(e),
        };

        self.index
            .remove_unreferenced(&entry.content_hash, &entry.blob_locator)
            .await?;
        Ok(deleted)
    }

    /// Release up to `limit` entries left at zero references.
    ///
    /// Failures are logged and skipped; the entry stays for the next run.
    pub async fn reap_unreferenced(&self, limit: u64) -> AppResult<u64> {
        let mut released = 0;
        for entry in self.index.unreferenced(limit).await? {
            match self.release(&entry).await {
                Ok(_) => released += 1,
                Err(e) => {
                    warn!(hash = %entry.content_hash, error = %e, "Failed to reap content");
                }
            }
        }
        if released > 0 {
            info!(released, "Reaped unreferenced content");
        }
        Ok(released)
    }

    async fn discard(&self, locator: Option<&str>) {
        let Some(locator) = locator else { return };
        if let Err(e) = self.blobs.delete(locator).await {
            if e.kind != ErrorKind::NotFound {
                warn!(locator, error = %e, "Failed to delete unused blob");
            }
        }
    }
}
