//! A single observer's view of an owner's job events.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use drivehub_core::types::{JobId, OwnerId};
use drivehub_entity::job::JobSnapshot;

use crate::event::ProgressEvent;
use crate::hub::ProgressHub;

/// Ordered stream of job events for one owner.
///
/// Starts with a [`ProgressEvent::Snapshot`] for every active job. After
/// that, each job's events arrive in sequence order with duplicates and
/// stale copies removed, and nothing arrives for a job after its terminal
/// event. Dropping the subscription has no effect on the jobs.
#[derive(Debug)]
pub struct Subscription {
    owner: OwnerId,
    rx: broadcast::Receiver<ProgressEvent>,
    queued: VecDeque<ProgressEvent>,
    /// Highest sequence delivered per job.
    seen: HashMap<JobId, u64>,
    /// Jobs whose terminal event was delivered.
    finished: HashSet<JobId>,
    hub: ProgressHub,
}

impl Subscription {
    pub(crate) fn new(
        owner: OwnerId,
        rx: broadcast::Receiver<ProgressEvent>,
        initial: Vec<JobSnapshot>,
        hub: ProgressHub,
    ) -> Self {
        let mut sub = Self {
            owner,
            rx,
            queued: VecDeque::new(),
            seen: HashMap::new(),
            finished: HashSet::new(),
            hub,
        };
        for job in initial {
            let event = ProgressEvent::Snapshot { job };
            if sub.accept(&event) {
                sub.queued.push_back(event);
            }
        }
        sub
    }

    /// The owner this subscription follows.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Wait for the next event. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }
            match self.rx.recv().await {
                Ok(event) => {
                    if self.accept(&event) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(owner = %self.owner, missed, "Progress subscriber lagged, resyncing");
                    self.resync();
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn accept(&mut self, event: &ProgressEvent) -> bool {
        let job_id = event.job_id();
        if self.finished.contains(&job_id) {
            return false;
        }
        if self
            .seen
            .get(&job_id)
            .is_some_and(|seq| *seq >= event.sequence())
        {
            return false;
        }
        self.seen.insert(job_id, event.sequence());
        if event.is_terminal() {
            self.finished.insert(job_id);
        }
        true
    }

    /// Replace whatever was missed with the hub's newest snapshots.
    fn resync(&mut self) {
        for job in self.hub.snapshots_for(self.owner) {
            let event = if self.seen.contains_key(&job.job_id) {
                ProgressEvent::for_state(job)
            } else if job.state.is_terminal() {
                continue;
            } else {
                ProgressEvent::Snapshot { job }
            };
            if self.accept(&event) {
                self.queued.push_back(event);
            }
        }
    }
}
