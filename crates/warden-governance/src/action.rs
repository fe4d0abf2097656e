use serde::{Deserialize, Serialize};
use std::fmt;

use warden_core::MaturityLevel;

/// Closed set of action types an agent can attempt. Unknown strings never
/// become an `ActionType` — [`ActionType::parse`] returns `None` and the
/// governance service denies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    PresentChart,
    StreamChat,
    PresentForm,
    SubmitForm,
    LlmStream,
    BrowserAction,
    IntegrationAction,
    WorkflowAction,
    AgentAction,
}

/// Which external executor a dispatched action routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Browser,
    Integration,
    Workflow,
    Agent,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Integration => "integration",
            Self::Workflow => "workflow",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ActionType {
    pub const ALL: [ActionType; 9] = [
        Self::PresentChart,
        Self::StreamChat,
        Self::PresentForm,
        Self::SubmitForm,
        Self::LlmStream,
        Self::BrowserAction,
        Self::IntegrationAction,
        Self::WorkflowAction,
        Self::AgentAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PresentChart => "present_chart",
            Self::StreamChat => "stream_chat",
            Self::PresentForm => "present_form",
            Self::SubmitForm => "submit_form",
            Self::LlmStream => "llm_stream",
            Self::BrowserAction => "browser_action",
            Self::IntegrationAction => "integration_action",
            Self::WorkflowAction => "workflow_action",
            Self::AgentAction => "agent_action",
        }
    }

    /// Parse an action-type string. Lookup fails closed: `None` means the
    /// action is unrecognized and must be denied.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.as_str() == s)
    }

    /// Complexity level 1-4. Purely informational alongside the tier; kept
    /// in the audit trail so promotion logic can weight outcomes.
    pub fn complexity(&self) -> u8 {
        match self {
            Self::PresentChart => 1,
            Self::StreamChat | Self::PresentForm | Self::LlmStream | Self::WorkflowAction => 2,
            Self::SubmitForm | Self::BrowserAction | Self::IntegrationAction => 3,
            Self::AgentAction => 4,
        }
    }

    /// Minimum maturity tier required to perform this action.
    pub fn required_maturity(&self) -> MaturityLevel {
        match self {
            Self::PresentChart => MaturityLevel::Student,
            Self::StreamChat | Self::PresentForm | Self::LlmStream | Self::WorkflowAction => {
                MaturityLevel::Intern
            }
            Self::SubmitForm | Self::BrowserAction | Self::IntegrationAction => {
                MaturityLevel::Supervised
            }
            // Sub-agent dispatch fans out uncontrolled downstream actions.
            Self::AgentAction => MaturityLevel::Autonomous,
        }
    }

    /// The executor this action dispatches to, for actions that run through
    /// the proposal pipeline. Interactive actions execute inline and have
    /// no executor.
    pub fn executor_kind(&self) -> Option<ExecutorKind> {
        match self {
            Self::BrowserAction => Some(ExecutorKind::Browser),
            Self::IntegrationAction => Some(ExecutorKind::Integration),
            Self::WorkflowAction => Some(ExecutorKind::Workflow),
            Self::AgentAction => Some(ExecutorKind::Agent),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
