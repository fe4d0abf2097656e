use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

use warden_core::{JobId, Result};

use crate::broker::Broker;
use crate::job::{Job, JobStatus, Lease};

/// In-memory broker for single-process deployments and tests. Preserves
/// the delivery semantics a real broker provides: at-least-once via lease
/// expiry, claim-then-ack, monotonic terminal statuses. Multiple workers
/// can pull from one instance; the internal mutex is the only coordination
/// needed.
pub struct InMemoryBroker {
    inner: Mutex<BrokerInner>,
    lease_ttl: Duration,
}

struct BrokerInner {
    /// Master copy of every job the broker has seen.
    jobs: HashMap<JobId, Job>,
    /// FIFO of queued job ids (due and future-scheduled alike; dequeue
    /// skips the not-yet-due).
    queued: VecDeque<JobId>,
    /// lease_id -> (job_id, expires_at)
    leased: HashMap<String, (JobId, DateTime<Utc>)>,
    statuses: HashMap<JobId, JobStatus>,
}

impl InMemoryBroker {
    pub fn new(lease_ttl: std::time::Duration) -> Self {
        Self {
            inner: Mutex::new(BrokerInner {
                jobs: HashMap::new(),
                queued: VecDeque::new(),
                leased: HashMap::new(),
                statuses: HashMap::new(),
            }),
            lease_ttl: Duration::from_std(lease_ttl).unwrap_or_else(|_| Duration::seconds(120)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(std::time::Duration::from_secs(120))
    }

    /// Move expired leases back onto the queue with a bumped attempt count.
    fn requeue_expired(inner: &mut BrokerInner, now: DateTime<Utc>) {
        let expired: Vec<String> = inner
            .leased
            .iter()
            .filter_map(|(lid, (_, exp))| (*exp <= now).then(|| lid.clone()))
            .collect();
        for lease_id in expired {
            if let Some((job_id, _)) = inner.leased.remove(&lease_id) {
                debug!(%job_id, "lease expired — redelivering");
                if let Some(job) = inner.jobs.get_mut(&job_id) {
                    job.attempt = job.attempt.saturating_add(1);
                }
                inner.statuses.insert(job_id.clone(), JobStatus::Queued);
                inner.queued.push_front(job_id);
            }
        }
    }

    fn set_status(inner: &mut BrokerInner, job_id: &str, to: JobStatus) -> bool {
        let current = inner
            .statuses
            .get(job_id)
            .copied()
            .unwrap_or(JobStatus::Queued);
        if current.can_transition(to) {
            inner.statuses.insert(job_id.to_string(), to);
            true
        } else {
            debug!(%job_id, from = %current, to = %to, "ignoring non-monotonic status transition");
            false
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(&self, job: Job) -> Result<JobId> {
        let mut inner = self.inner.lock();
        let id = job.id.clone();
        inner.statuses.insert(id.clone(), JobStatus::Queued);
        inner.queued.push_back(id.clone());
        inner.jobs.insert(id.clone(), job);
        Ok(id)
    }

    async fn dequeue_ready(&self, now: DateTime<Utc>) -> Result<Option<(Job, Lease)>> {
        let mut inner = self.inner.lock();
        Self::requeue_expired(&mut inner, now);

        // Find the first due job; skip over future-scheduled ones without
        // losing their queue position.
        let mut skipped = Vec::new();
        let mut claimed = None;
        while let Some(job_id) = inner.queued.pop_front() {
            let due = inner
                .jobs
                .get(&job_id)
                .is_some_and(|job| job.is_due(now));
            if due {
                claimed = Some(job_id);
                break;
            }
            skipped.push(job_id);
        }
        // Restore skipped ids ahead of the rest, preserving order
        for job_id in skipped.into_iter().rev() {
            inner.queued.push_front(job_id);
        }

        let Some(job_id) = claimed else {
            return Ok(None);
        };
        let Some(job) = inner.jobs.get(&job_id).cloned() else {
            // Queue entry without a master record — drop it.
            return Ok(None);
        };
        Self::set_status(&mut inner, &job_id, JobStatus::Running);
        let lease = Lease {
            job_id: job_id.clone(),
            lease_id: Uuid::new_v4().to_string(),
            expires_at: now + self.lease_ttl,
        };
        inner
            .leased
            .insert(lease.lease_id.clone(), (job_id, lease.expires_at));
        Ok(Some((job, lease)))
    }

    async fn ack(&self, lease: &Lease) -> Result<()> {
        self.inner.lock().leased.remove(&lease.lease_id);
        Ok(())
    }

    async fn nack(&self, lease: &Lease) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some((job_id, _)) = inner.leased.remove(&lease.lease_id) {
            if let Some(job) = inner.jobs.get_mut(&job_id) {
                job.attempt = job.attempt.saturating_add(1);
            }
            Self::set_status(&mut inner, &job_id, JobStatus::Queued);
            inner.queued.push_front(job_id);
        }
        Ok(())
    }

    async fn cancel(&self, job_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let queued_pos = inner.queued.iter().position(|id| id == job_id);
        match queued_pos {
            Some(pos) => {
                inner.queued.remove(pos);
                Self::set_status(&mut inner, job_id, JobStatus::Cancelled);
                Ok(true)
            }
            // Claimed, terminal, or unknown — cancellation is best-effort
            // and stops at the dequeue boundary.
            None => Ok(false),
        }
    }

    async fn finish(&self, job_id: &str, status: JobStatus) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::set_status(&mut inner, job_id, status);
        Ok(())
    }

    async fn status(&self, job_id: &str) -> Result<Option<JobStatus>> {
        Ok(self.inner.lock().statuses.get(job_id).copied())
    }

    async fn jobs_for_user(&self, user_id: &str) -> Result<Vec<(Job, JobStatus)>> {
        let inner = self.inner.lock();
        let mut jobs: Vec<(Job, JobStatus)> = inner
            .jobs
            .values()
            .filter(|job| job.user_id == user_id)
            .map(|job| {
                let status = inner
                    .statuses
                    .get(&job.id)
                    .copied()
                    .unwrap_or(JobStatus::Queued);
                (job.clone(), status)
            })
            .collect();
        jobs.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at));
        Ok(jobs)
    }

    async fn depth(&self) -> Result<usize> {
        Ok(self.inner.lock().queued.len())
    }
}
