use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use warden_core::{JobId, UserId};

/// Closed set of job types. Each kind has exactly one registered handler
/// on the worker side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Execute an approved proposal out-of-band.
    ProposalExecution,
    /// Deliver a notification to an agent's workspace.
    AgentNotification,
    /// Periodic ledger reconciliation sweep.
    LedgerReconciliation,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProposalExecution => "proposal_execution",
            Self::AgentNotification => "agent_notification",
            Self::LedgerReconciliation => "ledger_reconciliation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "proposal_execution" => Some(Self::ProposalExecution),
            "agent_notification" => Some(Self::AgentNotification),
            "ledger_reconciliation" => Some(Self::LedgerReconciliation),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle. Terminal states are sticky: the only legal transitions
/// out of a state are the ones listed in [`JobStatus::can_transition`],
/// and nothing leaves `Completed`, `Failed`, or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Queued → Running | Cancelled; Running → Completed | Failed, or back
    /// to Queued when a lease expires and the job is redelivered.
    pub fn can_transition(&self, to: JobStatus) -> bool {
        match (self, to) {
            (Self::Queued, Self::Running | Self::Cancelled) => true,
            (Self::Running, Self::Completed | Self::Failed | Self::Queued) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work submitted to the queue. Every enqueue call produces a
/// fresh id, including recurring firings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub user_id: UserId,
    /// When to run. None = as soon as a worker is free.
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Delivery attempt count; incremented on redelivery.
    pub attempt: u32,
}

impl Job {
    pub fn new(kind: JobKind, payload: serde_json::Value, user_id: impl Into<UserId>) -> Self {
        Self {
            id: format!("job_{}", Uuid::new_v4()),
            kind,
            payload,
            user_id: user_id.into(),
            scheduled_for: None,
            created_at: Utc::now(),
            attempt: 0,
        }
    }

    pub fn scheduled(mut self, when: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(when);
        self
    }

    /// Ready to run at `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for.is_none_or(|when| when <= now)
    }
}

/// Claim on an in-flight job. The broker redelivers the job if the lease
/// expires without an ack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub job_id: JobId,
    pub lease_id: String,
    pub expires_at: DateTime<Utc>,
}
