//! Observer view of a transfer job.

use chrono::{DateTime, Utc};
use drivehub_core::types::{JobId, NodeId, OwnerId, format_bytes, format_eta};
use serde::{Deserialize, Serialize};

use super::model::TransferJob;
use super::status::{JobKind, JobState};

/// A point-in-time view of a job, enriched with derived progress metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job identifier.
    pub job_id: JobId,
    /// Owning identity.
    pub owner: OwnerId,
    /// Job kind.
    pub kind: JobKind,
    /// Origin URL.
    pub source: String,
    /// Destination folder.
    pub target_folder_id: Option<NodeId>,
    /// Lifecycle state.
    pub state: JobState,
    /// File name, once known.
    pub file_name: Option<String>,
    /// Registered file, once completed.
    pub result_node_id: Option<NodeId>,
    /// Bytes received so far.
    pub bytes_transferred: u64,
    /// Declared total, when known.
    pub bytes_total: Option<u64>,
    /// Completion percentage, when the total is known.
    pub progress_percent: Option<f64>,
    /// Average throughput since the job started.
    pub speed_bytes_per_sec: f64,
    /// Estimated seconds remaining.
    pub eta_seconds: Option<u64>,
    /// `bytes_transferred` rendered for display.
    pub transferred_hr: String,
    /// `bytes_total` rendered for display, `N/A` when unknown.
    pub total_hr: String,
    /// `eta_seconds` rendered for display.
    pub eta_friendly: String,
    /// Whether a cancel request would still take effect.
    pub can_cancel: bool,
    /// Failure reason.
    pub error: Option<String>,
    /// Per-job change counter.
    pub sequence: u64,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal time.
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    /// Derive a snapshot from `job` as observed at `now`.
    pub fn from_job(job: &TransferJob, now: DateTime<Utc>) -> Self {
        let speed = match job.started_at {
            Some(started) => {
                let until = job.finished_at.unwrap_or(now);
                let elapsed = (until - started).num_milliseconds().max(1) as f64 / 1000.0;
                job.bytes_transferred as f64 / elapsed
            }
            None => 0.0,
        };

        let progress_percent = match (job.state, job.bytes_total) {
            (JobState::Completed, _) => Some(100.0),
            (_, Some(0)) => Some(0.0),
            (_, Some(total)) => {
                Some((job.bytes_transferred as f64 * 100.0 / total as f64).min(100.0))
            }
            (_, None) => None,
        };

        let eta_seconds = match (job.state, job.bytes_total) {
            (JobState::Running, Some(total)) if speed > 0.0 => {
                let remaining = total.saturating_sub(job.bytes_transferred) as f64;
                Some((remaining / speed).ceil() as u64)
            }
            _ => None,
        };

        Self {
            job_id: job.job_id,
            owner: job.owner,
            kind: job.kind,
            source: job.source.clone(),
            target_folder_id: job.target_folder_id,
            state: job.state,
            file_name: job.file_name.clone(),
            result_node_id: job.result_node_id,
            bytes_transferred: job.bytes_transferred,
            bytes_total: job.bytes_total,
            progress_percent,
            speed_bytes_per_sec: speed,
            eta_seconds,
            transferred_hr: format_bytes(job.bytes_transferred),
            total_hr: job.bytes_total.map_or_else(|| "N/A".to_string(), format_bytes),
            eta_friendly: format_eta(eta_seconds),
            can_cancel: !job.state.is_terminal(),
            error: job.error.clone(),
            sequence: job.sequence,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}
