//! Per-owner progress broadcast.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use drivehub_core::config::RealtimeConfig;
use drivehub_core::types::{JobId, OwnerId};
use drivehub_entity::job::JobSnapshot;

use crate::event::ProgressEvent;
use crate::subscription::Subscription;

/// Publish/subscribe relay for transfer job snapshots.
///
/// Keeps the newest snapshot of every active job so late subscribers can
/// start from current state, plus a bounded number of finished ones so a
/// lagging subscriber can still learn how a job ended.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    /// Owner → broadcast sender.
    channels: Arc<DashMap<OwnerId, broadcast::Sender<ProgressEvent>>>,
    /// Job → newest snapshot.
    latest: Arc<DashMap<JobId, JobSnapshot>>,
    /// Buffer size of each owner channel, also the number of finished
    /// snapshots retained.
    capacity: usize,
}

impl ProgressHub {
    /// Create a new hub.
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            latest: Arc::new(DashMap::new()),
            capacity: config.channel_capacity.max(1),
        }
    }

    /// Publish a job snapshot to the owner's subscribers.
    ///
    /// Snapshots older than the one already held for the job are dropped.
    /// Never blocks; returns the number of subscribers reached.
    pub fn publish(&self, snapshot: JobSnapshot) -> usize {
        let owner = snapshot.owner;
        let terminal = snapshot.state.is_terminal();

        {
            let mut slot = self
                .latest
                .entry(snapshot.job_id)
                .or_insert_with(|| snapshot.clone());
            if slot.sequence > snapshot.sequence {
                debug!(job_id = %snapshot.job_id, "Dropping stale snapshot");
                return 0;
            }
            *slot = snapshot.clone();
        }
        if terminal {
            self.evict_finished();
        }

        let event = ProgressEvent::for_state(snapshot);
        let delivered = match self.channels.get(&owner) {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        };
        if delivered == 0 {
            self.channels.remove_if(&owner, |_, tx| tx.receiver_count() == 0);
        }
        delivered
    }

    /// Subscribe to an owner's job events.
    pub fn subscribe(&self, owner: OwnerId) -> Subscription {
        // Receiver first, snapshot second: anything published in between
        // shows up twice and the subscription drops the older copy.
        let rx = self
            .channels
            .entry(owner)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        let initial = self
            .snapshots_for(owner)
            .into_iter()
            .filter(|s| !s.state.is_terminal())
            .collect();
        Subscription::new(owner, rx, initial, self.clone())
    }

    /// Newest snapshot held for a job.
    pub fn latest(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.latest.get(&job_id).map(|s| s.clone())
    }

    /// Every snapshot held for an owner, oldest job first.
    pub fn snapshots_for(&self, owner: OwnerId) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self
            .latest
            .iter()
            .filter(|s| s.owner == owner)
            .map(|s| s.clone())
            .collect();
        snapshots.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        snapshots
    }

    /// Number of live subscribers for an owner.
    pub fn subscriber_count(&self, owner: OwnerId) -> usize {
        self.channels
            .get(&owner)
            .map_or(0, |tx| tx.receiver_count())
    }

    fn evict_finished(&self) {
        let mut finished: Vec<(JobId, Option<DateTime<Utc>>)> = self
            .latest
            .iter()
            .filter(|s| s.state.is_terminal())
            .map(|s| (s.job_id, s.finished_at))
            .collect();
        if finished.len() <= self.capacity {
            return;
        }
        finished.sort_by_key(|(_, at)| *at);
        let excess = finished.len() - self.capacity;
        for (job_id, _) in finished.into_iter().take(excess) {
            self.latest.remove(&job_id);
        }
    }
}
