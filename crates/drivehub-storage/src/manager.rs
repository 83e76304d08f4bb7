//! Blob manager: the configured backend behind per-call timeouts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use drivehub_core::config::{StorageBackend, StorageConfig};
use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::traits::blob::{BlobStore, ByteStream};

use crate::providers::{LocalBlobStore, MemoryBlobStore};

/// Wraps a [`BlobStore`] so that no call can hang: each operation that
/// exceeds its budget fails with `StorageUnavailable`.
#[derive(Debug, Clone)]
pub struct BlobManager {
    inner: Arc<dyn BlobStore>,
    put_timeout: Duration,
    get_timeout: Duration,
    delete_timeout: Duration,
}

impl BlobManager {
    /// Wrap an existing store with the timeouts from `config`.
    pub fn new(inner: Arc<dyn BlobStore>, config: &StorageConfig) -> Self {
        Self {
            inner,
            put_timeout: Duration::from_secs(config.put_timeout_seconds),
            get_timeout: Duration::from_secs(config.get_timeout_seconds),
            delete_timeout: Duration::from_secs(config.delete_timeout_seconds),
        }
    }

    /// Build the backend selected in `config`.
    pub async fn from_config(config: &StorageConfig) -> AppResult<Self> {
        let inner: Arc<dyn BlobStore> = match config.backend {
            StorageBackend::Local => Arc::new(LocalBlobStore::new(&config.local.root_path).await?),
            StorageBackend::Memory => Arc::new(MemoryBlobStore::new()),
        };
        info!(provider = inner.provider_type(), "Blob store initialised");
        Ok(Self::new(inner, config))
    }

    async fn bounded<T>(
        &self,
        op: &str,
        budget: Duration,
        fut: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = budget.as_millis() as u64, "Blob store call timed out");
                Err(AppError::storage_unavailable(format!(
                    "Blob store {op} timed out after {}s",
                    budget.as_secs_f64()
                )))
            }
        }
    }
}

#[async_trait]
impl BlobStore for BlobManager {
    fn provider_type(&self) -> &str {
        self.inner.provider_type()
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.bounded("health check", self.get_timeout, self.inner.health_check())
            .await
    }

    async fn put(&self, stream: ByteStream) -> AppResult<String> {
        self.bounded("put", self.put_timeout, self.inner.put(stream))
            .await
    }

    async fn get(&self, locator: &str) -> AppResult<ByteStream> {
        self.bounded("get", self.get_timeout, self.inner.get(locator))
            .await
    }

    async fn delete(&self, locator: &str) -> AppResult<()> {
        self.bounded("delete", self.delete_timeout, self.inner.delete(locator))
            .await
    }
}
