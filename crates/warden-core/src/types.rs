use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier for an agent (assigned by the external registry).
pub type AgentId = String;

/// Unique identifier for a workspace.
pub type WorkspaceId = String;

/// Unique identifier for a user.
pub type UserId = String;

/// Unique identifier for a session.
pub type SessionId = String;

/// Unique identifier for an execution ledger row.
pub type ExecutionId = String;

/// Opaque, stable identifier for a queued job.
pub type JobId = String;

/// Four maturity tiers gating which actions an agent may perform:
///
/// - **STUDENT**: only trivial, read-only presentations.
/// - **INTERN**: routine interactive actions.
/// - **SUPERVISED**: side-effecting actions (form submission, external calls).
/// - **AUTONOMOUS**: unattended fan-out, including sub-agent dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum MaturityLevel {
    Student = 0,
    Intern = 1,
    Supervised = 2,
    Autonomous = 3,
}

impl MaturityLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Student,
            1 => Self::Intern,
            2 => Self::Supervised,
            3 => Self::Autonomous,
            _ => Self::Student, // fail closed
        }
    }

    /// Canonical upper-case name, used in decision reasons and audit rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Intern => "INTERN",
            Self::Supervised => "SUPERVISED",
            Self::Autonomous => "AUTONOMOUS",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Student => "Read-only presentations only",
            Self::Intern => "Routine interactive actions",
            Self::Supervised => "Side-effecting actions under supervision",
            Self::Autonomous => "Unattended execution including sub-agent dispatch",
        }
    }
}

impl fmt::Display for MaturityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An agent as read from the external registry. This core never mutates
/// agents; maturity promotion happens upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub display_name: String,
    pub maturity: MaturityLevel,
    pub workspace_id: WorkspaceId,
    /// Free-form context supplied by the registry. Downstream notification
    /// flows honor a `workspace_id` override placed here.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl Agent {
    pub fn new(
        id: impl Into<AgentId>,
        display_name: impl Into<String>,
        maturity: MaturityLevel,
        workspace_id: impl Into<WorkspaceId>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            maturity,
            workspace_id: workspace_id.into(),
            context: HashMap::new(),
        }
    }

    /// Workspace to target for notifications: the `workspace_id` context
    /// override when present, the binding workspace otherwise.
    pub fn notification_workspace(&self) -> &str {
        self.context
            .get("workspace_id")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.workspace_id)
    }
}
