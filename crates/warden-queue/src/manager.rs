use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

use warden_core::{JobId, Result, WardenError};
use warden_ledger::LedgerStore;

use crate::broker::Broker;
use crate::job::{Job, JobKind, JobStatus};

/// A cron-driven job template. Each due firing enqueues a fresh one-shot
/// job with its own id.
#[derive(Debug, Clone, Serialize)]
pub struct RecurringSchedule {
    pub id: String,
    pub expression: String,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_fired: Option<DateTime<Utc>>,
    pub fire_count: u64,
}

/// Counters + queue depth for the stats endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub enqueued_total: u64,
    pub cancelled_total: u64,
    pub recurring_schedules: usize,
}

/// Front door to the queue. Every broker failure surfaces as the retryable
/// [`WardenError::QueueUnavailable`] — never a crash, never a raw broker
/// error leaking to callers.
pub struct QueueManager {
    broker: Arc<dyn Broker>,
    history: Arc<LedgerStore>,
    recurring: Mutex<Vec<RecurringSchedule>>,
    enqueued_total: AtomicU64,
    cancelled_total: AtomicU64,
}

impl QueueManager {
    pub fn new(broker: Arc<dyn Broker>, history: Arc<LedgerStore>) -> Self {
        Self {
            broker,
            history,
            recurring: Mutex::new(Vec::new()),
            enqueued_total: AtomicU64::new(0),
            cancelled_total: AtomicU64::new(0),
        }
    }

    /// Enqueue a job to run as soon as a worker is free.
    pub async fn enqueue_now(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        user_id: &str,
    ) -> Result<JobId> {
        let job = Job::new(kind, payload, user_id);
        self.submit(job).await
    }

    /// Enqueue a job to run at (or after) `when`.
    pub async fn enqueue_scheduled(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        user_id: &str,
        when: DateTime<Utc>,
    ) -> Result<JobId> {
        let job = Job::new(kind, payload, user_id).scheduled(when);
        self.submit(job).await
    }

    async fn submit(&self, job: Job) -> Result<JobId> {
        let kind = job.kind;
        let id = self
            .broker
            .enqueue(job)
            .await
            .map_err(Self::degrade)?;
        self.enqueued_total.fetch_add(1, Ordering::Relaxed);
        info!(job_id = %id, kind = %kind, "enqueued job");
        Ok(id)
    }

    /// Register a recurring schedule. The cron expression is validated up
    /// front; firings happen in [`QueueManager::poll_recurring`].
    pub fn add_recurring(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        user_id: &str,
        cron_expr: &str,
    ) -> Result<String> {
        Schedule::from_str(cron_expr)
            .map_err(|e| WardenError::InvalidSchedule(format!("invalid cron expression: {e}")))?;

        let schedule = RecurringSchedule {
            id: Uuid::new_v4().to_string(),
            expression: cron_expr.to_string(),
            kind,
            payload,
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            last_fired: None,
            fire_count: 0,
        };
        let id = schedule.id.clone();
        self.recurring.lock().push(schedule);
        info!(schedule_id = %id, cron = cron_expr, kind = %kind, "registered recurring schedule");
        Ok(id)
    }

    pub fn remove_recurring(&self, schedule_id: &str) -> bool {
        let mut recurring = self.recurring.lock();
        let before = recurring.len();
        recurring.retain(|s| s.id != schedule_id);
        recurring.len() != before
    }

    pub fn recurring_schedules(&self) -> Vec<RecurringSchedule> {
        self.recurring.lock().clone()
    }

    /// Enqueue a fresh job for every recurring schedule that is due at
    /// `now`. Called from the worker poll loop.
    pub async fn poll_recurring(&self, now: DateTime<Utc>) -> Result<Vec<JobId>> {
        let due: Vec<(String, JobKind, serde_json::Value, String)> = {
            let mut recurring = self.recurring.lock();
            let mut due = Vec::new();
            for schedule in recurring.iter_mut() {
                let since = schedule.last_fired.unwrap_or(schedule.created_at);
                let fires = match Schedule::from_str(&schedule.expression) {
                    Ok(s) => s
                        .after(&since)
                        .take(1)
                        .next()
                        .is_some_and(|next| next <= now),
                    Err(e) => {
                        warn!(schedule_id = %schedule.id, error = %e, "invalid stored cron expression — skipping");
                        false
                    }
                };
                if fires {
                    schedule.last_fired = Some(now);
                    schedule.fire_count += 1;
                    due.push((
                        schedule.id.clone(),
                        schedule.kind,
                        schedule.payload.clone(),
                        schedule.user_id.clone(),
                    ));
                }
            }
            due
        };

        let mut fired = Vec::new();
        for (schedule_id, kind, payload, user_id) in due {
            let job_id = self.enqueue_now(kind, payload, &user_id).await?;
            info!(schedule_id = %schedule_id, job_id = %job_id, "recurring schedule fired");
            fired.push(job_id);
        }
        Ok(fired)
    }

    /// Current status of a job. Falls back to the durable history when the
    /// broker no longer knows the id (e.g. after a restart).
    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatus> {
        if let Some(status) = self.broker.status(job_id).await.map_err(Self::degrade)? {
            return Ok(status);
        }
        match self.history.find_job_result(job_id)? {
            Some(record) if record.ok => Ok(JobStatus::Completed),
            Some(_) => Ok(JobStatus::Failed),
            None => Err(WardenError::JobNotFound(job_id.to_string())),
        }
    }

    /// Cancel a queued job. Returns false once a worker has claimed it or
    /// it is terminal — cancellation is best-effort, not guaranteed.
    pub async fn cancel_job(&self, job_id: &str) -> Result<bool> {
        let cancelled = self.broker.cancel(job_id).await.map_err(Self::degrade)?;
        if cancelled {
            self.cancelled_total.fetch_add(1, Ordering::Relaxed);
            info!(%job_id, "cancelled queued job");
        } else {
            info!(%job_id, "cancel refused — job already running or terminal");
        }
        Ok(cancelled)
    }

    pub async fn list_jobs(&self, user_id: &str) -> Result<Vec<(Job, JobStatus)>> {
        self.broker
            .jobs_for_user(user_id)
            .await
            .map_err(Self::degrade)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let depth = self.broker.depth().await.map_err(Self::degrade)?;
        Ok(QueueStats {
            depth,
            enqueued_total: self.enqueued_total.load(Ordering::Relaxed),
            cancelled_total: self.cancelled_total.load(Ordering::Relaxed),
            recurring_schedules: self.recurring.lock().len(),
        })
    }

    /// Collapse any broker failure into the retryable error kind.
    fn degrade(err: WardenError) -> WardenError {
        match err {
            already @ WardenError::QueueUnavailable(_) => already,
            other => {
                warn!(error = %other, "broker call failed — reporting queue unavailable");
                WardenError::QueueUnavailable(other.public_message())
            }
        }
    }
}
