//! Transfer job entity model.

use chrono::{DateTime, Utc};
use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::types::{JobId, NodeId, OwnerId};
use serde::{Deserialize, Serialize};

use super::snapshot::JobSnapshot;
use super::status::{JobKind, JobState};

/// A background transfer and its progress.
///
/// Every observable change bumps `sequence`, so observers can order
/// snapshots of the same job without relying on clocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferJob {
    /// Unique job identifier.
    pub job_id: JobId,
    /// The identity that submitted the job.
    pub owner: OwnerId,
    /// What the job does.
    pub kind: JobKind,
    /// Origin URL.
    pub source: String,
    /// Folder receiving the file (None for the owner's root).
    pub target_folder_id: Option<NodeId>,
    /// Current lifecycle state.
    pub state: JobState,
    /// Name the file will be (or was) registered under.
    pub file_name: Option<String>,
    /// The registered file, once completed.
    pub result_node_id: Option<NodeId>,
    /// Bytes received so far.
    pub bytes_transferred: u64,
    /// Declared total, when known.
    pub bytes_total: Option<u64>,
    /// Failure reason.
    pub error: Option<String>,
    /// Monotonic per-job change counter.
    pub sequence: u64,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// When a worker picked the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// When the job last changed.
    pub updated_at: DateTime<Utc>,
}

impl TransferJob {
    /// Move the job to `next`, stamping start/finish times.
    pub fn transition(&mut self, next: JobState, now: DateTime<Utc>) -> AppResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::invalid_operation(format!(
                "Job {} cannot move from {} to {}",
                self.job_id, self.state, next
            )));
        }
        self.state = next;
        if next == JobState::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.touch(now);
        Ok(())
    }

    /// Record transfer progress. The byte count never decreases.
    pub fn record_progress(&mut self, bytes_transferred: u64, now: DateTime<Utc>) {
        self.bytes_transferred = self.bytes_transferred.max(bytes_transferred);
        self.touch(now);
    }

    /// Mark the job failed with `reason`.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(JobState::Failed, now)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Build the observer view of this job at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> JobSnapshot {
        JobSnapshot::from_job(self, now)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.sequence += 1;
        self.updated_at = now;
    }
}

/// Data required to submit a transfer job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransferJob {
    /// The submitting identity.
    pub owner: OwnerId,
    /// What the job does.
    pub kind: JobKind,
    /// Origin URL.
    pub source: String,
    /// Destination folder (None for root).
    pub target_folder_id: Option<NodeId>,
}

impl NewTransferJob {
    /// Materialise a queued job.
    pub fn into_job(self, now: DateTime<Utc>) -> TransferJob {
        TransferJob {
            job_id: JobId::new(),
            owner: self.owner,
            kind: self.kind,
            source: self.source,
            target_folder_id: self.target_folder_id,
            state: JobState::Queued,
            file_name: None,
            result_node_id: None,
            bytes_transferred: 0,
            bytes_total: None,
            error: None,
            sequence: 1,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }
}
