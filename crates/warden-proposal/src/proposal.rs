use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use warden_core::{AgentId, WorkspaceId};

/// Proposal lifecycle.
///
/// `pending → {approved, rejected}`; `approved → executing → {completed,
/// failed}`; any non-terminal state → `cancelled` while a cancellation can
/// still win the race with dispatch completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Completed | Self::Failed | Self::Cancelled
        )
    }

    pub fn can_transition(&self, to: ProposalStatus) -> bool {
        match (self, to) {
            (Self::Pending, Self::Approved | Self::Rejected | Self::Cancelled) => true,
            (Self::Approved, Self::Executing | Self::Rejected | Self::Cancelled) => true,
            (Self::Executing, Self::Completed | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The action a proposal wants performed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedAction {
    pub action_type: String,
    pub parameters: serde_json::Value,
}

/// Input for creating a proposal.
#[derive(Debug, Clone)]
pub struct ProposalDraft {
    pub agent_id: AgentId,
    pub workspace_id: WorkspaceId,
    pub proposal_type: String,
    pub title: String,
    pub reasoning: String,
    pub action_type: String,
    pub parameters: serde_json::Value,
    pub modifications: Vec<String>,
}

/// An agent-originated request to perform an action, subject to approval
/// and governance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub agent_id: AgentId,
    pub workspace_id: WorkspaceId,
    pub proposal_type: String,
    pub title: String,
    pub reasoning: String,
    pub proposed_action: ProposedAction,
    /// Ordered overlay edits ("key: value"), applied to the action
    /// parameters before dispatch. A list rather than a map so the edits
    /// stay discrete and ordered.
    pub modifications: Vec<String>,
    pub status: ProposalStatus,
    /// Why the proposal is in its current state (denial reason, error, ...).
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(draft: ProposalDraft) -> Self {
        let now = Utc::now();
        Self {
            id: format!("prop_{}", Uuid::new_v4()),
            agent_id: draft.agent_id,
            workspace_id: draft.workspace_id,
            proposal_type: draft.proposal_type,
            title: draft.title,
            reasoning: draft.reasoning,
            proposed_action: ProposedAction {
                action_type: draft.action_type,
                parameters: draft.parameters,
            },
            modifications: draft.modifications,
            status: ProposalStatus::Pending,
            status_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The action parameters with the modification overlays applied, in
    /// order. Each `"key: value"` edit sets one string field; entries
    /// without a colon are skipped.
    pub fn effective_parameters(&self) -> serde_json::Value {
        let mut params = self.proposed_action.parameters.clone();
        if !params.is_object() {
            params = serde_json::json!({});
        }
        for modification in &self.modifications {
            let Some((key, value)) = modification.split_once(':') else {
                debug!(%modification, "modification without 'key: value' shape — skipping");
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                continue;
            }
            params[key] = serde_json::Value::String(value.to_string());
        }
        params
    }
}
