//! Cron scheduler for periodic maintenance tasks.

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing;

use drivehub_core::config::BinConfig;
use drivehub_core::error::AppError;
use drivehub_service::{BinService, ContentAddresser};

/// Cron expression for retrying deferred blob releases.
const CONTENT_REAP_SCHEDULE: &str = "0 */10 * * * *";

/// Entries retried per reap run.
const CONTENT_REAP_BATCH: u64 = 500;

/// Cron-based scheduler for recycle bin expiry and content reaping.
pub struct CronScheduler {
    /// The underlying job scheduler
    scheduler: JobScheduler,
    bin: Arc<BinService>,
    addresser: Arc<ContentAddresser>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler
    pub async fn new(
        bin: Arc<BinService>,
        addresser: Arc<ContentAddresser>,
    ) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            bin,
            addresser,
        })
    }

    /// Register all maintenance tasks
    pub async fn register_default_tasks(&self, config: &BinConfig) -> Result<(), AppError> {
        self.register_bin_purge(&config.purge_schedule).await?;
        self.register_content_reap().await?;

        tracing::info!("All scheduled tasks registered");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }

    /// Permanently delete bin roots past retention.
    async fn register_bin_purge(&self, schedule: &str) -> Result<(), AppError> {
        let bin = Arc::clone(&self.bin);
        let job = CronJob::new_async(schedule, move |_uuid, _lock| {
            let bin = Arc::clone(&bin);
            Box::pin(async move {
                match bin.purge_expired(Utc::now()).await {
                    Ok(report) => tracing::debug!(
                        roots = report.roots,
                        blobs_deferred = report.deleted.blobs_deferred,
                        "Recycle bin purge run finished"
                    ),
                    Err(e) => tracing::error!("Recycle bin purge failed: {}", e),
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create bin_purge schedule: {}", e)))?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::internal(format!("Failed to add bin_purge schedule: {}", e))
        })?;

        tracing::info!("Registered: bin_purge ({})", schedule);
        Ok(())
    }

    /// Retry blob releases deferred by storage outages.
    async fn register_content_reap(&self) -> Result<(), AppError> {
        let addresser = Arc::clone(&self.addresser);
        let job = CronJob::new_async(CONTENT_REAP_SCHEDULE, move |_uuid, _lock| {
            let addresser = Arc::clone(&addresser);
            Box::pin(async move {
                match addresser.reap_unreferenced(CONTENT_REAP_BATCH).await {
                    Ok(0) => {}
                    Ok(reaped) => tracing::info!(reaped, "Released unreferenced content"),
                    Err(e) => tracing::error!("Content reap failed: {}", e),
                }
            })
        })
        .map_err(|e| {
            AppError::internal(format!("Failed to create content_reap schedule: {}", e))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::internal(format!("Failed to add content_reap schedule: {}", e))
        })?;

        tracing::info!("Registered: content_reap (every 10min)");
        Ok(())
    }
}
