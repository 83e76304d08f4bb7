//! Progress event envelope.

use serde::{Deserialize, Serialize};

use drivehub_core::types::JobId;
use drivehub_entity::job::{JobSnapshot, JobState};

/// An event delivered to progress subscribers.
///
/// Serialized as `{"event": "<name>", "job": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Current state of a job, sent on subscribe and after a resync.
    Snapshot {
        /// The job.
        job: JobSnapshot,
    },
    /// A queued or running job changed.
    Progress {
        /// The job.
        job: JobSnapshot,
    },
    /// The job finished and its file is registered.
    Completed {
        /// The job.
        job: JobSnapshot,
    },
    /// The job failed.
    Failed {
        /// The job.
        job: JobSnapshot,
    },
    /// The job was cancelled by its owner.
    Cancelled {
        /// The job.
        job: JobSnapshot,
    },
}

impl ProgressEvent {
    /// The event matching the snapshot's state.
    pub fn for_state(job: JobSnapshot) -> Self {
        match job.state {
            JobState::Queued | JobState::Running => Self::Progress { job },
            JobState::Completed => Self::Completed { job },
            JobState::Failed => Self::Failed { job },
            JobState::Cancelled => Self::Cancelled { job },
        }
    }

    /// The carried snapshot.
    pub fn job(&self) -> &JobSnapshot {
        match self {
            Self::Snapshot { job }
            | Self::Progress { job }
            | Self::Completed { job }
            | Self::Failed { job }
            | Self::Cancelled { job } => job,
        }
    }

    /// The job this event is about.
    pub fn job_id(&self) -> JobId {
        self.job().job_id
    }

    /// Per-job sequence number of the carried snapshot.
    pub fn sequence(&self) -> u64 {
        self.job().sequence
    }

    /// Whether no further events follow for this job.
    pub fn is_terminal(&self) -> bool {
        self.job().state.is_terminal()
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use drivehub_core::types::OwnerId;
    use drivehub_entity::job::{JobKind, NewTransferJob};

    #[test]
    fn test_event_envelope_is_tagged() {
        let now = Utc::now();
        let mut job = NewTransferJob {
            owner: OwnerId::new(),
            kind: JobKind::UrlDownload,
            source: "https://example.com/a.bin".to_string(),
            target_folder_id: None,
        }
        .into_job(now);
        job.transition(JobState::Cancelled, now).expect("cancel");

        let event = ProgressEvent::for_state(job.snapshot(now));
        assert_eq!(event.name(), "cancelled");
        assert!(event.is_terminal());

        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "cancelled");
        assert_eq!(json["job"]["state"], "cancelled");
    }
}
