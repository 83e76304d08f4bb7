//! Transfer job registry and lifecycle control.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use drivehub_core::config::TransferConfig;
use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::traits::source::RemoteSource;
use drivehub_core::types::{JobId, NodeId, PageRequest, PageResponse};
use drivehub_database::store::JobStore;
use drivehub_entity::job::{JobKind, JobSnapshot, JobState, NewTransferJob, TransferJob};
use drivehub_realtime::ProgressHub;
use drivehub_service::{NodeService, RequestContext};
use drivehub_storage::StagingArea;

use crate::source::naming::{file_name_from_url, is_downloadable};

/// How long [`TaskManager::shutdown`] waits for in-flight jobs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Request to download a URL into a folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// http(s) URL to fetch.
    pub url: String,
    /// Destination folder (None for the owner's root).
    #[serde(default)]
    pub target_folder_id: Option<NodeId>,
}

/// A job that has not finished yet.
#[derive(Debug)]
pub(crate) struct ActiveJob {
    /// Authoritative state while the job is active.
    pub(crate) job: TransferJob,
    /// Triggered by an owner's cancel request.
    pub(crate) cancel: CancellationToken,
}

/// Runs URL downloads in the background and tracks their state.
///
/// Active jobs live in an in-memory registry and every change is persisted
/// to the [`JobStore`] and published on the [`ProgressHub`]. At most
/// `max_concurrent` jobs transfer at once; the rest wait in `Queued`.
#[derive(Debug, Clone)]
pub struct TaskManager {
    pub(crate) registry: Arc<DashMap<JobId, ActiveJob>>,
    pub(crate) jobs: Arc<dyn JobStore>,
    pub(crate) nodes: Arc<NodeService>,
    pub(crate) source: Arc<dyn RemoteSource>,
    pub(crate) hub: ProgressHub,
    pub(crate) staging: StagingArea,
    /// Transfer slots.
    pub(crate) slots: Arc<Semaphore>,
    /// Admission slots, one per active job.
    admission: Arc<Semaphore>,
    pub(crate) config: TransferConfig,
    pub(crate) shutdown: CancellationToken,
}

impl TaskManager {
    /// Creates a new task manager.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        nodes: Arc<NodeService>,
        source: Arc<dyn RemoteSource>,
        hub: ProgressHub,
        staging: StagingArea,
        config: &TransferConfig,
    ) -> Self {
        Self {
            registry: Arc::new(DashMap::new()),
            jobs,
            nodes,
            source,
            hub,
            staging,
            slots: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            admission: Arc::new(Semaphore::new(config.max_active_jobs.max(1))),
            config: config.clone(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Accepts a download and starts it in the background.
    ///
    /// Returns the queued job's snapshot without waiting for any bytes.
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        request: SubmitRequest,
    ) -> AppResult<JobSnapshot> {
        let url = request.url.trim();
        if !is_downloadable(url) {
            return Err(AppError::validation(format!(
                "Not an http(s) URL: {url}"
            )));
        }
        if let Some(folder_id) = request.target_folder_id {
            let folder = self.nodes.get_live(ctx, folder_id).await?;
            if !folder.is_folder() {
                return Err(AppError::validation(format!(
                    "Node {folder_id} is not a folder"
                )));
            }
        }
        if self.shutdown.is_cancelled() {
            return Err(AppError::storage_unavailable(
                "Transfer manager is shutting down",
            ));
        }
        let admission = self.admission.clone().try_acquire_owned().map_err(|_| {
            AppError::storage_unavailable(format!(
                "Too many active transfers (limit {})",
                self.config.max_active_jobs
            ))
        })?;

        let now = Utc::now();
        let mut job = NewTransferJob {
            owner: ctx.owner,
            kind: JobKind::UrlDownload,
            source: url.to_string(),
            target_folder_id: request.target_folder_id,
        }
        .into_job(now);
        job.file_name = Some(file_name_from_url(url));
        self.jobs.save_job(&job).await?;

        let job_id = job.job_id;
        let cancel = CancellationToken::new();
        self.registry.insert(
            job_id,
            ActiveJob {
                job: job.clone(),
                cancel: cancel.clone(),
            },
        );
        let snapshot = job.snapshot(now);
        self.hub.publish(snapshot.clone());

        info!(
            owner = %ctx.owner,
            job_id = %job_id,
            url,
            file_name = job.file_name.as_deref().unwrap_or_default(),
            "Transfer queued"
        );

        let manager = self.clone();
        tokio::spawn(async move {
            let _admission = admission;
            manager.run(job_id, cancel).await;
        });

        Ok(snapshot)
    }

    /// Current state of a job, active or finished.
    pub async fn status(&self, ctx: &RequestContext, job_id: JobId) -> AppResult<JobSnapshot> {
        let active = self.registry.get(&job_id).map(|entry| entry.job.clone());
        let job = match active {
            Some(job) => job,
            None => self
                .jobs
                .get_job(job_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Job {job_id} not found")))?,
        };
        ctx.require_owner(job.owner)?;
        Ok(job.snapshot(Utc::now()))
    }

    /// Requests cancellation.
    ///
    /// A queued job is cancelled on the spot. A running job stops at its
    /// next chunk boundary; the returned snapshot still shows it running.
    pub async fn cancel(&self, ctx: &RequestContext, job_id: JobId) -> AppResult<JobSnapshot> {
        let decision = self.registry.get_mut(&job_id).map(|mut entry| {
            ctx.require_owner(entry.job.owner)?;
            entry.cancel.cancel();
            if entry.job.state == JobState::Queued {
                entry.job.transition(JobState::Cancelled, Utc::now())?;
            }
            Ok::<_, AppError>(entry.job.clone())
        });

        let job = match decision {
            Some(result) => result?,
            None => {
                let job = self
                    .jobs
                    .get_job(job_id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Job {job_id} not found")))?;
                ctx.require_owner(job.owner)?;
                return Err(AppError::invalid_operation(format!(
                    "Job {job_id} already {}",
                    job.state
                )));
            }
        };

        info!(owner = %ctx.owner, job_id = %job_id, state = %job.state, "Transfer cancel requested");
        if job.state == JobState::Cancelled {
            self.emit(&job, true).await;
            self.registry.remove(&job_id);
        }
        Ok(job.snapshot(Utc::now()))
    }

    /// The caller's unfinished jobs, oldest first.
    pub fn list_active(&self, ctx: &RequestContext) -> Vec<JobSnapshot> {
        let now = Utc::now();
        let mut jobs: Vec<JobSnapshot> = self
            .registry
            .iter()
            .filter(|entry| entry.job.owner == ctx.owner)
            .map(|entry| entry.job.snapshot(now))
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.job_id.cmp(&b.job_id)));
        jobs
    }

    /// The caller's persisted jobs, most recently updated first.
    pub async fn history(
        &self,
        ctx: &RequestContext,
        state: Option<JobState>,
        page: &PageRequest,
    ) -> AppResult<PageResponse<TransferJob>> {
        self.jobs.job_history(ctx.owner, state, page).await
    }

    /// Marks jobs left unfinished by a previous process as failed.
    ///
    /// Call once at startup before accepting submissions.
    pub async fn recover(&self) -> AppResult<u64> {
        let now = Utc::now();
        let mut recovered = 0u64;
        for mut job in self.jobs.unfinished_jobs().await? {
            if self.registry.contains_key(&job.job_id) {
                continue;
            }
            job.fail("Interrupted by restart", now)?;
            self.jobs.save_job(&job).await?;
            recovered += 1;
        }
        if recovered > 0 {
            warn!(recovered, "Failed transfers interrupted by restart");
        }
        Ok(recovered)
    }

    /// Whether the job is still active.
    pub fn is_active(&self, job_id: JobId) -> bool {
        self.registry.contains_key(&job_id)
    }

    /// Stops accepting work, interrupts active jobs, and waits for them to
    /// record their final state.
    pub async fn shutdown(&self) {
        info!(active = self.registry.len(), "Transfer manager shutting down");
        self.shutdown.cancel();

        let permits = u32::try_from(self.config.max_concurrent.max(1)).unwrap_or(u32::MAX);
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            let _ = self.slots.acquire_many(permits).await;
            while !self.registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => info!("Transfer manager shut down"),
            Err(_) => warn!(
                remaining = self.registry.len(),
                "Transfers still active after shutdown grace period"
            ),
        }
    }

    /// Applies `f` to an active job. `None` if the job is no longer
    /// registered; on error the job is unchanged.
    pub(crate) fn apply<F>(&self, job_id: JobId, f: F) -> Option<AppResult<TransferJob>>
    where
        F: FnOnce(&mut TransferJob) -> AppResult<()>,
    {
        self.registry.get_mut(&job_id).map(|mut entry| {
            f(&mut entry.job)?;
            Ok(entry.job.clone())
        })
    }

    /// Publishes a job change, persisting it when `persist` is set.
    pub(crate) async fn emit(&self, job: &TransferJob, persist: bool) {
        if persist {
            if let Err(e) = self.jobs.save_job(job).await {
                warn!(job_id = %job.job_id, error = %e, "Failed to persist transfer state");
            }
        }
        self.hub.publish(job.snapshot(Utc::now()));
    }
}
