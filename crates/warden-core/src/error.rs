use thiserror::Error;

use crate::types::MaturityLevel;

/// Unified error type for the entire Warden core.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Governance errors ──────────────────────────────────────
    #[error("action '{action}' denied: required: {required}, actual: {actual}")]
    PermissionDenied {
        action: String,
        required: MaturityLevel,
        actual: MaturityLevel,
    },

    #[error("no agent available: {0}")]
    ResolutionFailed(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    // ── Ledger errors ──────────────────────────────────────────
    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("ledger inconsistency: {0}")]
    LedgerInconsistency(String),

    // ── Queue errors ───────────────────────────────────────────
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {job_id} failed: {reason}")]
    JobExecutionFailed { job_id: String, reason: String },

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    // ── Proposal errors ────────────────────────────────────────
    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("invalid proposal transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("executor error: {kind}: {reason}")]
    Executor { kind: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WardenError {
    /// Stable machine-readable kind, exposed in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "permission_denied",
            Self::ResolutionFailed(_) => "resolution_failed",
            Self::AgentNotFound(_) => "agent_not_found",
            Self::Ledger(_) => "ledger_error",
            Self::LedgerInconsistency(_) => "ledger_inconsistency",
            Self::QueueUnavailable(_) => "queue_unavailable",
            Self::JobNotFound(_) => "job_not_found",
            Self::JobExecutionFailed { .. } => "job_execution_failed",
            Self::InvalidSchedule(_) => "invalid_schedule",
            Self::ProposalNotFound(_) => "proposal_not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Executor { .. } => "executor_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Other(_) => "internal_error",
        }
    }

    /// Whether a caller should retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueUnavailable(_))
    }

    /// Message safe to show outside the process. Known kinds pass their
    /// display text through; unexpected internals are masked.
    pub fn public_message(&self) -> String {
        match self {
            Self::Io(_) | Self::Serialization(_) | Self::Other(_) => {
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
