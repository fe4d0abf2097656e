use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use warden_core::Result;
use warden_ledger::LedgerStore;

use crate::broker::Broker;
use crate::job::{Job, JobKind, JobStatus, Lease};

/// Executes jobs of one kind. Handlers must be idempotent under
/// redelivery: the broker guarantees at-least-once, not exactly-once.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value>;
}

/// Pulls ready jobs from the broker and runs the registered handler for
/// each. Several workers may run against the same broker; the broker's
/// claim/ack protocol is the only coordination.
pub struct Worker {
    broker: Arc<dyn Broker>,
    history: Arc<LedgerStore>,
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(broker: Arc<dyn Broker>, history: Arc<LedgerStore>, poll_interval: Duration) -> Self {
        Self {
            broker,
            history,
            handlers: HashMap::new(),
            poll_interval,
        }
    }

    pub fn register(mut self, kind: JobKind, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Drain every job due at `now`. Returns how many were processed.
    /// Handler failures are absorbed here — they fail the job, never the
    /// worker.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut processed = 0;
        while let Some((job, lease)) = self.broker.dequeue_ready(now).await? {
            self.process(job, lease).await;
            processed += 1;
        }
        Ok(processed)
    }

    /// Run the worker loop. Spawn this as a background task; it only exits
    /// if the tokio runtime shuts down.
    pub async fn run(self: Arc<Self>) {
        info!(
            poll_secs = self.poll_interval.as_secs(),
            "worker started"
        );
        loop {
            tokio::time::sleep(self.poll_interval).await;
            match self.tick(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => debug!(processed = n, "worker tick"),
                // Broker unreachable — degrade, keep polling
                Err(e) => warn!(error = %e, "worker tick failed"),
            }
        }
    }

    async fn process(&self, job: Job, lease: Lease) {
        // Dedupe: a history record means some delivery of this job already
        // ran to completion. Skip the handler and settle the redelivery.
        match self.history.find_job_result(&job.id) {
            Ok(Some(record)) => {
                debug!(job_id = %job.id, "redelivery of a settled job — skipping handler");
                let status = if record.ok {
                    JobStatus::Completed
                } else {
                    JobStatus::Failed
                };
                let _ = self.broker.finish(&job.id, status).await;
                let _ = self.broker.ack(&lease).await;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                // Can't prove it wasn't already handled; leave the lease to
                // expire and retry later.
                warn!(job_id = %job.id, error = %e, "history lookup failed — deferring job");
                let _ = self.broker.nack(&lease).await;
                return;
            }
        }

        let Some(handler) = self.handlers.get(&job.kind) else {
            error!(job_id = %job.id, kind = %job.kind, "no handler registered for job kind");
            let _ = self.history.record_job_result(
                Some(&job.id),
                job.kind.as_str(),
                false,
                None,
                Some("no handler registered"),
            );
            let _ = self.broker.finish(&job.id, JobStatus::Failed).await;
            let _ = self.broker.ack(&lease).await;
            return;
        };

        debug!(job_id = %job.id, kind = %job.kind, attempt = job.attempt, "executing job");
        let outcome = handler.handle(&job).await;

        let (ok, output, error_msg) = match &outcome {
            Ok(value) => (true, Some(value.to_string()), None),
            Err(e) => {
                error!(
                    job_id = %job.id,
                    kind = %job.kind,
                    error = %e,
                    "job handler failed"
                );
                (false, None, Some(e.to_string()))
            }
        };

        if let Err(e) = self.history.record_job_result(
            Some(&job.id),
            job.kind.as_str(),
            ok,
            output.as_deref(),
            error_msg.as_deref(),
        ) {
            // Result not durable yet — let the lease redeliver so the
            // (idempotent) handler run is retried with a working history.
            warn!(job_id = %job.id, error = %e, "failed to persist job result — will redeliver");
            let _ = self.broker.nack(&lease).await;
            return;
        }

        let status = if ok {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        if let Err(e) = self.broker.finish(&job.id, status).await {
            warn!(job_id = %job.id, error = %e, "failed to record terminal job status");
        }
        let _ = self.broker.ack(&lease).await;
    }
}
