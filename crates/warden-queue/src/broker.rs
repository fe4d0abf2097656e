use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_core::{JobId, Result, WardenError};

use crate::job::{Job, JobStatus, Lease};

/// Message-broker seam. Delivery is at-least-once: a job whose lease
/// expires without an ack is handed out again with an incremented attempt
/// counter, so handlers must be idempotent under redelivery.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Accept a job. Returns its id.
    async fn enqueue(&self, job: Job) -> Result<JobId>;

    /// Claim the next job that is due at `now`, if any. Jobs with a future
    /// `scheduled_for` are not handed out.
    async fn dequeue_ready(&self, now: DateTime<Utc>) -> Result<Option<(Job, Lease)>>;

    /// Acknowledge a claimed job, removing it from in-flight tracking.
    async fn ack(&self, lease: &Lease) -> Result<()>;

    /// Return a claimed job to the queue for redelivery.
    async fn nack(&self, lease: &Lease) -> Result<()>;

    /// Cancel a job. True only if it was still queued; a job a worker has
    /// already claimed (or that is terminal/unknown) returns false.
    async fn cancel(&self, job_id: &str) -> Result<bool>;

    /// Record a terminal status for a claimed job. Transitions violating
    /// monotonicity are ignored.
    async fn finish(&self, job_id: &str, status: JobStatus) -> Result<()>;

    /// Current status, if the broker still knows the job.
    async fn status(&self, job_id: &str) -> Result<Option<JobStatus>>;

    /// All jobs for a user with their statuses.
    async fn jobs_for_user(&self, user_id: &str) -> Result<Vec<(Job, JobStatus)>>;

    /// Number of jobs waiting (queued, including future-scheduled).
    async fn depth(&self) -> Result<usize>;
}

/// Broker double that is always unreachable. Exercises the degraded-mode
/// paths: every call fails with a retryable error.
pub struct UnreachableBroker;

fn down<T>() -> Result<T> {
    Err(WardenError::QueueUnavailable("broker unreachable".into()))
}

#[async_trait]
impl Broker for UnreachableBroker {
    async fn enqueue(&self, _job: Job) -> Result<JobId> {
        down()
    }

    async fn dequeue_ready(&self, _now: DateTime<Utc>) -> Result<Option<(Job, Lease)>> {
        down()
    }

    async fn ack(&self, _lease: &Lease) -> Result<()> {
        down()
    }

    async fn nack(&self, _lease: &Lease) -> Result<()> {
        down()
    }

    async fn cancel(&self, _job_id: &str) -> Result<bool> {
        down()
    }

    async fn finish(&self, _job_id: &str, _status: JobStatus) -> Result<()> {
        down()
    }

    async fn status(&self, _job_id: &str) -> Result<Option<JobStatus>> {
        down()
    }

    async fn jobs_for_user(&self, _user_id: &str) -> Result<Vec<(Job, JobStatus)>> {
        down()
    }

    async fn depth(&self) -> Result<usize> {
        down()
    }
}
