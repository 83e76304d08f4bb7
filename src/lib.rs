//! DriveHub engine assembly.
//!
//! Wires the record stores, blob store, and services together from an
//! [`AppConfig`]. The server binary and the integration tests both build
//! an [`Engine`] through here.

use std::sync::Arc;

use tracing::info;

use drivehub_core::config::{AppConfig, DatabaseBackend};
use drivehub_core::result::AppResult;
use drivehub_core::traits::blob::BlobStore;
use drivehub_core::traits::source::RemoteSource;
use drivehub_database::{
    ContentIndexStore, DatabasePool, JobStore, MemoryStore, NodeStore, PgStore, ShareStore,
};
use drivehub_realtime::ProgressHub;
use drivehub_service::{BinService, ContentAddresser, NodeService, ShareService, TreeService};
use drivehub_storage::{BlobManager, StagingArea};
use drivehub_worker::{HttpSource, TaskManager};

/// The record store roles, usually served by one backend.
#[derive(Debug, Clone)]
pub struct Stores {
    /// Node records.
    pub nodes: Arc<dyn NodeStore>,
    /// Content index.
    pub index: Arc<dyn ContentIndexStore>,
    /// Transfer job history.
    pub jobs: Arc<dyn JobStore>,
    /// Share links.
    pub shares: Arc<dyn ShareStore>,
}

impl Stores {
    /// Serve every role from one backend.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: NodeStore + ContentIndexStore + JobStore + ShareStore,
    {
        Self {
            nodes: store.clone(),
            index: store.clone(),
            jobs: store.clone(),
            shares: store,
        }
    }
}

/// Every service of a running engine.
#[derive(Debug, Clone)]
pub struct Engine {
    /// Node operations.
    pub nodes: Arc<NodeService>,
    /// Ancestry and tree views.
    pub tree: Arc<TreeService>,
    /// Recycle bin.
    pub bin: Arc<BinService>,
    /// Public file links.
    pub shares: Arc<ShareService>,
    /// Content index and blob lifecycle.
    pub addresser: Arc<ContentAddresser>,
    /// Background transfers.
    pub tasks: TaskManager,
    /// Progress relay.
    pub progress: ProgressHub,
    /// Open pool when the Postgres backend is in use.
    pub database: Option<DatabasePool>,
}

impl Engine {
    /// Build the engine with the backends and HTTP source named in `config`.
    pub async fn build(config: &AppConfig) -> AppResult<Self> {
        let (stores, database) = match config.database.backend {
            DatabaseBackend::Postgres => {
                let pool = DatabasePool::connect(&config.database).await?;
                drivehub_database::migration::run_migrations(pool.pool()).await?;
                let store = Arc::new(PgStore::new(pool.pool().clone()));
                (Stores::shared(store), Some(pool))
            }
            DatabaseBackend::Memory => {
                info!("Using in-memory record store; state is lost on exit");
                (Stores::shared(Arc::new(MemoryStore::new())), None)
            }
        };
        let blobs: Arc<dyn BlobStore> = Arc::new(BlobManager::from_config(&config.storage).await?);
        let source: Arc<dyn RemoteSource> = Arc::new(HttpSource::new(&config.transfer)?);

        let mut engine = Self::assemble(config, stores, blobs, source).await?;
        engine.database = database;
        Ok(engine)
    }

    /// Build the engine over explicit backends.
    pub async fn assemble(
        config: &AppConfig,
        stores: Stores,
        blobs: Arc<dyn BlobStore>,
        source: Arc<dyn RemoteSource>,
    ) -> AppResult<Self> {
        let addresser = Arc::new(ContentAddresser::new(
            stores.nodes.clone(),
            stores.index.clone(),
            blobs,
        ));
        let nodes = Arc::new(NodeService::new(
            stores.nodes.clone(),
            addresser.clone(),
            &config.tree,
        ));
        let tree = Arc::new(TreeService::new(stores.nodes.clone(), &config.tree));
        let bin = Arc::new(BinService::new(stores.nodes.clone(), nodes.clone(), &config.bin));
        let shares = Arc::new(ShareService::new(stores.shares, nodes.clone()));
        let progress = ProgressHub::new(&config.realtime);
        let staging = StagingArea::new(&config.transfer.temp_dir).await?;
        let tasks = TaskManager::new(
            stores.jobs,
            nodes.clone(),
            source,
            progress.clone(),
            staging,
            &config.transfer,
        );

        Ok(Self {
            nodes,
            tree,
            bin,
            shares,
            addresser,
            tasks,
            progress,
            database: None,
        })
    }
}
