//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use drivehub::{Engine, Stores};
use drivehub_core::config::AppConfig;
use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::traits::blob::{BlobStore, ByteStream};
use drivehub_core::traits::source::{RemoteContent, RemoteSource};
use drivehub_core::types::{JobId, NodeId, OwnerId};
use drivehub_database::MemoryStore;
use drivehub_database::store::{
    BinOutcome, DeletedNode, FileInsertOutcome, NodeStore, RestoreOutcome,
};
use drivehub_entity::job::JobSnapshot;
use drivehub_entity::node::Node;
use drivehub_service::RequestContext;
use drivehub_service::node::RegisterFileRequest;
use drivehub_storage::digest::digest_bytes;
use drivehub_storage::providers::MemoryBlobStore;

/// Test application context
pub struct TestApp {
    /// The assembled engine
    pub engine: Engine,
    /// Record store behind the engine
    pub store: Arc<MemoryStore>,
    /// Node store wrapper that can be made to fail deletes
    pub nodes: Arc<FlakyNodeStore>,
    /// Blob store wrapper recording deletes
    pub blobs: Arc<RecordingBlobStore>,
    /// Scripted remote source
    pub source: Arc<ScriptedSource>,
    /// Application config
    pub config: AppConfig,
    _staging: tempfile::TempDir,
}

impl TestApp {
    /// Create a new test application
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test application after adjusting the default config
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let staging = tempfile::tempdir().expect("Failed to create staging dir");
        let mut config = AppConfig::default();
        config.transfer.temp_dir = staging.path().to_string_lossy().into_owned();
        adjust(&mut config);

        let store = Arc::new(MemoryStore::new());
        let nodes = Arc::new(FlakyNodeStore::new(store.clone()));
        let blobs = Arc::new(RecordingBlobStore::default());
        let source = Arc::new(ScriptedSource::default());

        let stores = Stores {
            nodes: nodes.clone(),
            index: store.clone(),
            jobs: store.clone(),
            shares: store.clone(),
        };
        let engine = Engine::assemble(&config, stores, blobs.clone(), source.clone())
            .await
            .expect("Failed to assemble engine");

        Self {
            engine,
            store,
            nodes,
            blobs,
            source,
            config,
            _staging: staging,
        }
    }

    /// A context for a fresh owner
    pub fn owner(&self) -> RequestContext {
        RequestContext::new(OwnerId::new())
    }

    /// Create a folder
    pub async fn folder(&self, ctx: &RequestContext, parent: Option<NodeId>, name: &str) -> Node {
        self.engine
            .nodes
            .create_folder(ctx, parent, name)
            .await
            .expect("Failed to create folder")
    }

    /// Upload bytes to the blob store and register them as a file
    pub async fn file(
        &self,
        ctx: &RequestContext,
        parent: Option<NodeId>,
        name: &str,
        data: &[u8],
    ) -> Node {
        let request = self.upload(parent, name, data).await;
        self.engine
            .nodes
            .register_file(ctx, request)
            .await
            .expect("Failed to register file")
    }

    /// Upload bytes and build the matching registration request
    pub async fn upload(
        &self,
        parent: Option<NodeId>,
        name: &str,
        data: &[u8],
    ) -> RegisterFileRequest {
        let blob_locator = self
            .blobs
            .put(byte_stream(data.to_vec()))
            .await
            .expect("Failed to upload blob");
        RegisterFileRequest {
            parent_id: parent,
            name: name.to_string(),
            size_bytes: data.len() as u64,
            content_hash: digest_bytes(data),
            blob_locator,
            mime_type: "application/octet-stream".to_string(),
        }
    }

    /// Poll a job until it leaves the registry, then return its final state
    pub async fn wait_for_job(&self, ctx: &RequestContext, job_id: JobId) -> JobSnapshot {
        for _ in 0..500 {
            if !self.engine.tasks.is_active(job_id) {
                return self
                    .engine
                    .tasks
                    .status(ctx, job_id)
                    .await
                    .expect("Failed to read job status");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Job {job_id} did not finish");
    }

    /// Poll a job until `check` accepts its snapshot
    pub async fn wait_until(
        &self,
        ctx: &RequestContext,
        job_id: JobId,
        check: impl Fn(&JobSnapshot) -> bool,
    ) -> JobSnapshot {
        for _ in 0..500 {
            let snapshot = self
                .engine
                .tasks
                .status(ctx, job_id)
                .await
                .expect("Failed to read job status");
            if check(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Job {job_id} never reached the expected state");
    }
}

/// Wrap owned bytes as a single-chunk stream
pub fn byte_stream(data: Vec<u8>) -> ByteStream {
    Box::pin(futures::stream::iter(vec![Ok(Bytes::from(data))]))
}

/// Blob store that records every successful delete
#[derive(Debug, Default)]
pub struct RecordingBlobStore {
    inner: MemoryBlobStore,
    deleted: Mutex<Vec<String>>,
}

impl RecordingBlobStore {
    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether a blob exists under `locator`
    pub fn contains(&self, locator: &str) -> bool {
        self.inner.contains(locator)
    }

    /// Toggle availability
    pub fn set_online(&self, online: bool) {
        self.inner.set_online(online);
    }

    /// Drain the delete log
    pub fn take_deleted(&self) -> Vec<String> {
        std::mem::take(&mut *self.deleted.lock().expect("delete log poisoned"))
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    fn provider_type(&self) -> &str {
        "recording"
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    async fn put(&self, stream: ByteStream) -> AppResult<String> {
        self.inner.put(stream).await
    }

    async fn get(&self, locator: &str) -> AppResult<ByteStream> {
        self.inner.get(locator).await
    }

    async fn delete(&self, locator: &str) -> AppResult<()> {
        self.inner.delete(locator).await?;
        self.deleted
            .lock()
            .expect("delete log poisoned")
            .push(locator.to_string());
        Ok(())
    }
}

/// Node store that fails `delete_node` once a budget is spent
#[derive(Debug)]
pub struct FlakyNodeStore {
    inner: Arc<MemoryStore>,
    delete_budget: AtomicUsize,
}

impl FlakyNodeStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            delete_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// Allow only `n` more node deletes
    pub fn fail_deletes_after(&self, n: usize) {
        self.delete_budget.store(n, Ordering::SeqCst);
    }

    /// Lift the delete budget
    pub fn heal(&self) {
        self.delete_budget.store(usize::MAX, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeStore for FlakyNodeStore {
    async fn get(&self, id: NodeId) -> AppResult<Option<Node>> {
        self.inner.get(id).await
    }

    async fn insert_folder(&self, node: Node) -> AppResult<Node> {
        self.inner.insert_folder(node).await
    }

    async fn insert_file(
        &self,
        node: Node,
        fresh_locator: Option<&str>,
    ) -> AppResult<FileInsertOutcome> {
        self.inner.insert_file(node, fresh_locator).await
    }

    async fn rename(&self, id: NodeId, name: &str, now: DateTime<Utc>) -> AppResult<Node> {
        self.inner.rename(id, name, now).await
    }

    async fn move_to(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
        now: DateTime<Utc>,
        max_depth: usize,
    ) -> AppResult<Node> {
        self.inner.move_to(id, new_parent, now, max_depth).await
    }

    async fn set_starred(
        &self,
        id: NodeId,
        starred: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Node> {
        self.inner.set_starred(id, starred, now).await
    }

    async fn bin_subtree(&self, id: NodeId, now: DateTime<Utc>) -> AppResult<BinOutcome> {
        self.inner.bin_subtree(id, now).await
    }

    async fn restore_subtree(&self, id: NodeId, now: DateTime<Utc>) -> AppResult<RestoreOutcome> {
        self.inner.restore_subtree(id, now).await
    }

    async fn delete_node(&self, id: NodeId) -> AppResult<Option<DeletedNode>> {
        let spent = self
            .delete_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                if left == usize::MAX {
                    Some(left)
                } else {
                    left.checked_sub(1)
                }
            });
        if spent.is_err() {
            return Err(AppError::database("Connection reset"));
        }
        self.inner.delete_node(id).await
    }

    async fn children(&self, owner: OwnerId, parent: Option<NodeId>) -> AppResult<Vec<Node>> {
        self.inner.children(owner, parent).await
    }

    async fn search(&self, owner: OwnerId, needle: &str) -> AppResult<Vec<Node>> {
        self.inner.search(owner, needle).await
    }

    async fn starred(&self, owner: OwnerId) -> AppResult<Vec<Node>> {
        self.inner.starred(owner).await
    }

    async fn bin_roots(
        &self,
        owner: Option<OwnerId>,
        binned_before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Node>> {
        self.inner.bin_roots(owner, binned_before).await
    }

    async fn count_for_owner(&self, owner: OwnerId) -> AppResult<u64> {
        self.inner.count_for_owner(owner).await
    }

    async fn usage_bytes(&self, owner: OwnerId) -> AppResult<u64> {
        self.inner.usage_bytes(owner).await
    }
}

/// What the scripted source serves for one URL
#[derive(Debug)]
pub enum Script {
    /// Serve these chunks immediately
    Chunks {
        chunks: Vec<Bytes>,
        total: Option<u64>,
        content_type: Option<String>,
    },
    /// Serve whatever the test sends, ending when the sender is dropped
    Gated {
        rx: mpsc::UnboundedReceiver<std::io::Result<Bytes>>,
        total: Option<u64>,
    },
    /// Refuse to connect
    Refuse(String),
}

/// Remote source answering from per-URL scripts, each usable once
#[derive(Debug, Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, Script>>,
}

impl ScriptedSource {
    /// Serve `chunks` at `url`, declaring their total length
    pub fn serve(&self, url: &str, chunks: &[&[u8]], content_type: Option<&str>) {
        let chunks: Vec<Bytes> = chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect();
        let total = chunks.iter().map(|c| c.len() as u64).sum();
        self.script(
            url,
            Script::Chunks {
                chunks,
                total: Some(total),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    /// Serve chunks pushed through the returned sender
    pub fn gate(
        &self,
        url: &str,
        total: Option<u64>,
    ) -> mpsc::UnboundedSender<std::io::Result<Bytes>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script(url, Script::Gated { rx, total });
        tx
    }

    /// Install a script for `url`
    pub fn script(&self, url: &str, script: Script) {
        self.scripts
            .lock()
            .expect("scripts poisoned")
            .insert(url.to_string(), script);
    }
}

#[async_trait]
impl RemoteSource for ScriptedSource {
    async fn open(&self, url: &str) -> AppResult<RemoteContent> {
        let script = self.scripts.lock().expect("scripts poisoned").remove(url);
        match script {
            Some(Script::Chunks {
                chunks,
                total,
                content_type,
            }) => Ok(RemoteContent {
                total_bytes: total,
                content_type,
                stream: Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))),
            }),
            Some(Script::Gated { rx, total }) => Ok(RemoteContent {
                total_bytes: total,
                content_type: None,
                stream: Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })),
            }),
            Some(Script::Refuse(reason)) => Err(AppError::external_service(reason)),
            None => Err(AppError::not_found(format!("Source {url} answered 404 Not Found"))),
        }
    }
}
