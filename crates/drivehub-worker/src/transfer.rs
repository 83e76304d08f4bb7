//! The download loop behind each transfer job.

use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use drivehub_core::error::ErrorKind;
use drivehub_core::types::{JobId, NodeId, format_bytes};
use drivehub_entity::job::{JobState, TransferJob};
use drivehub_service::RequestContext;
use drivehub_service::node::DEFAULT_MIME_TYPE;
use drivehub_storage::StagedFile;

use crate::manager::TaskManager;
use crate::source::naming::guess_mime;

/// Name collisions tolerated while registering a finished download.
const MAX_NAME_ATTEMPTS: usize = 5;

/// How a transfer ended.
#[derive(Debug)]
enum Outcome {
    Completed { node_id: NodeId, file_name: String },
    Cancelled,
    Interrupted,
    Failed(String),
}

/// What the download produced before registration.
struct Downloaded {
    staged: StagedFile,
    content_type: Option<String>,
}

impl TaskManager {
    /// Drives one job from `Queued` to a terminal state.
    pub(crate) async fn run(&self, job_id: JobId, cancel: CancellationToken) {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            _ = self.shutdown.cancelled() => None,
            permit = self.slots.clone().acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            // A queued cancel is recorded and unregistered by `cancel`.
            if !cancel.is_cancelled() {
                self.finish(job_id, Outcome::Interrupted).await;
            }
            return;
        };

        let job = match self.apply(job_id, |job| job.transition(JobState::Running, Utc::now())) {
            Some(Ok(job)) => job,
            // Cancelled between acquiring the slot and starting.
            _ => {
                self.registry.remove(&job_id);
                return;
            }
        };
        self.emit(&job, true).await;
        info!(job_id = %job_id, owner = %job.owner, url = %job.source, "Transfer started");

        let outcome = match self.download(&job, &cancel).await {
            Ok(downloaded) => {
                if cancel.is_cancelled() {
                    Outcome::Cancelled
                } else {
                    self.register(&job, downloaded).await
                }
            }
            Err(outcome) => outcome,
        };
        self.finish(job_id, outcome).await;
    }

    /// Streams the source into the staging area.
    async fn download(
        &self,
        job: &TransferJob,
        cancel: &CancellationToken,
    ) -> Result<Downloaded, Outcome> {
        let job_id = job.job_id;
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Outcome::Cancelled),
            _ = self.shutdown.cancelled() => return Err(Outcome::Interrupted),
            opened = self.source.open(&job.source) => opened,
        };
        let content = opened.map_err(|e| Outcome::Failed(e.message))?;

        let limit = self.config.max_download_bytes;
        if let Some(total) = content.total_bytes {
            if total > limit {
                return Err(Outcome::Failed(format!(
                    "Remote file is {}, over the {} limit",
                    format_bytes(total),
                    format_bytes(limit)
                )));
            }
            if let Some(Ok(job)) = self.apply(job_id, |job| {
                job.bytes_total = Some(total);
                job.record_progress(0, Utc::now());
                Ok(())
            }) {
                self.emit(&job, true).await;
            }
        }

        let mut writer = self
            .staging
            .writer()
            .await
            .map_err(|e| Outcome::Failed(e.message))?;
        let mut stream = content.stream;
        let read_timeout = Duration::from_secs(self.config.read_timeout_seconds.max(1));
        let persist_every = Duration::from_millis(self.config.progress_persist_interval_ms);
        let mut last_persist = Instant::now();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Outcome::Cancelled),
                _ = self.shutdown.cancelled() => return Err(Outcome::Interrupted),
                next = tokio::time::timeout(read_timeout, stream.next()) => next,
            };
            let chunk = match next {
                Err(_) => {
                    return Err(Outcome::Failed(format!(
                        "No data received for {}s",
                        read_timeout.as_secs()
                    )));
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(Outcome::Failed(format!("Read error: {e}"))),
                Ok(Some(Ok(chunk))) => chunk,
            };

            writer
                .write_chunk(&chunk)
                .await
                .map_err(|e| Outcome::Failed(e.message))?;
            let written = writer.bytes_written();
            if written > limit {
                return Err(Outcome::Failed(format!(
                    "Download exceeded the {} limit",
                    format_bytes(limit)
                )));
            }
            if let Some(total) = content.total_bytes {
                if written > total {
                    return Err(Outcome::Failed(format!(
                        "Source sent more than the declared {total} bytes"
                    )));
                }
            }

            if let Some(Ok(job)) = self.apply(job_id, |job| {
                job.record_progress(written, Utc::now());
                Ok(())
            }) {
                let persist = last_persist.elapsed() >= persist_every;
                if persist {
                    last_persist = Instant::now();
                }
                self.emit(&job, persist).await;
            }
        }

        let written = writer.bytes_written();
        if let Some(total) = content.total_bytes {
            if written < total {
                return Err(Outcome::Failed(format!(
                    "Connection closed after {written} of {total} bytes"
                )));
            }
        }

        let staged = writer
            .finish()
            .await
            .map_err(|e| Outcome::Failed(e.message))?;
        Ok(Downloaded {
            staged,
            content_type: content.content_type,
        })
    }

    /// Registers the staged file under a free name in the target folder.
    async fn register(&self, job: &TransferJob, downloaded: Downloaded) -> Outcome {
        let ctx = RequestContext::new(job.owner);
        let desired = job.file_name.clone().unwrap_or_default();
        let mime_type = downloaded
            .content_type
            .clone()
            .or_else(|| guess_mime(&desired).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        let mut attempts = 0;
        loop {
            attempts += 1;
            let file_name = match self
                .nodes
                .available_name(&ctx, job.target_folder_id, &desired)
                .await
            {
                Ok(name) => name,
                Err(e) => return Outcome::Failed(e.message),
            };
            match self
                .nodes
                .register_staged(
                    &ctx,
                    job.target_folder_id,
                    &file_name,
                    &downloaded.staged,
                    &mime_type,
                )
                .await
            {
                Ok(node) => {
                    return Outcome::Completed {
                        node_id: node.id,
                        file_name,
                    };
                }
                Err(e) if e.kind == ErrorKind::Conflict && attempts < MAX_NAME_ATTEMPTS => {
                    warn!(job_id = %job.job_id, file_name = %file_name, "Name taken during registration, retrying");
                }
                Err(e) => return Outcome::Failed(e.message),
            }
        }
    }

    /// Records the terminal state, then drops the job from the registry.
    async fn finish(&self, job_id: JobId, outcome: Outcome) {
        let now = Utc::now();
        let applied = self.apply(job_id, |job| match &outcome {
            Outcome::Completed { node_id, file_name } => {
                job.transition(JobState::Completed, now)?;
                job.result_node_id = Some(*node_id);
                job.file_name = Some(file_name.clone());
                Ok(())
            }
            Outcome::Cancelled => job.transition(JobState::Cancelled, now),
            Outcome::Interrupted => job.fail("Interrupted by shutdown", now),
            Outcome::Failed(reason) => job.fail(reason.clone(), now),
        });

        match applied {
            Some(Ok(job)) => {
                match job.state {
                    JobState::Completed => info!(
                        job_id = %job_id,
                        owner = %job.owner,
                        bytes = job.bytes_transferred,
                        "Transfer completed"
                    ),
                    JobState::Cancelled => info!(job_id = %job_id, owner = %job.owner, "Transfer cancelled"),
                    _ => warn!(
                        job_id = %job_id,
                        owner = %job.owner,
                        error = job.error.as_deref().unwrap_or_default(),
                        "Transfer failed"
                    ),
                }
                self.emit(&job, true).await;
            }
            Some(Err(e)) => warn!(job_id = %job_id, error = %e, "Transfer already finished"),
            None => {}
        }
        self.registry.remove(&job_id);
    }
}
