use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use warden_core::{Agent, Result, WardenError};

use crate::directory::AgentDirectory;

/// Which resolution rule selected the agent. Recorded for audit — the
/// ledger's input summary carries it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// The caller named an agent and it belongs to the workspace.
    ExplicitRequest,
    /// An agent was bound to the supplied session.
    SessionBinding,
    /// The workspace default / most-recently-used agent.
    WorkspaceDefault,
}

impl ResolutionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitRequest => "explicit_request",
            Self::SessionBinding => "session_binding",
            Self::WorkspaceDefault => "workspace_default",
        }
    }
}

impl fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record of a resolution: who asked, what fired, for which action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionContext {
    pub resolution_path: ResolutionPath,
    pub user_id: String,
    pub workspace_id: String,
    pub session_id: Option<String>,
    pub requested_agent_id: Option<String>,
    pub action_type: String,
}

impl ResolutionContext {
    /// One-line summary consumed by the execution ledger.
    pub fn input_summary(&self) -> String {
        format!(
            "action={} user={} workspace={} resolved_via={}",
            self.action_type, self.user_id, self.workspace_id, self.resolution_path
        )
    }
}

/// Picks the agent that should handle a request.
pub struct ContextResolver {
    directory: Arc<dyn AgentDirectory>,
}

impl ContextResolver {
    pub fn new(directory: Arc<dyn AgentDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve an agent for a request. Precedence, first match wins:
    ///
    /// 1. explicit `requested_agent_id`, if it exists and belongs to the workspace
    /// 2. the agent bound to `session_id`
    /// 3. the workspace default / most-recently-used agent
    /// 4. fail with [`WardenError::ResolutionFailed`]
    pub async fn resolve(
        &self,
        user_id: &str,
        workspace_id: &str,
        session_id: Option<&str>,
        requested_agent_id: Option<&str>,
        action_type: &str,
    ) -> Result<(Agent, ResolutionContext)> {
        let context = |path: ResolutionPath| ResolutionContext {
            resolution_path: path,
            user_id: user_id.to_string(),
            workspace_id: workspace_id.to_string(),
            session_id: session_id.map(str::to_string),
            requested_agent_id: requested_agent_id.map(str::to_string),
            action_type: action_type.to_string(),
        };

        if let Some(requested) = requested_agent_id {
            match self.directory.get(requested).await? {
                Some(agent) if agent.workspace_id == workspace_id => {
                    debug!(agent_id = %agent.id, "resolved via explicit request");
                    return Ok((agent, context(ResolutionPath::ExplicitRequest)));
                }
                Some(agent) => {
                    debug!(
                        agent_id = %agent.id,
                        agent_workspace = %agent.workspace_id,
                        requested_workspace = %workspace_id,
                        "requested agent belongs to another workspace — falling through"
                    );
                }
                None => {
                    debug!(requested_agent_id = %requested, "requested agent not found — falling through");
                }
            }
        }

        if let Some(session) = session_id {
            if let Some(agent) = self.directory.agent_for_session(session).await? {
                if agent.workspace_id == workspace_id {
                    debug!(agent_id = %agent.id, session_id = %session, "resolved via session binding");
                    return Ok((agent, context(ResolutionPath::SessionBinding)));
                }
            }
        }

        if let Some(agent) = self.directory.default_for_workspace(workspace_id).await? {
            debug!(agent_id = %agent.id, "resolved via workspace default");
            return Ok((agent, context(ResolutionPath::WorkspaceDefault)));
        }

        Err(WardenError::ResolutionFailed(format!(
            "no agent available for workspace {workspace_id}"
        )))
    }
}
