use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use warden_core::{Agent, AgentId, MaturityLevel, Result, SessionId, WorkspaceId};

/// Read API onto the external agent registry.
///
/// Implementations may be network-backed; every call can fail, so the
/// methods return `Result` even when the happy path is a plain lookup.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Look up an agent by id.
    async fn get(&self, agent_id: &str) -> Result<Option<Agent>>;

    /// The agent bound to a session, if any.
    async fn agent_for_session(&self, session_id: &str) -> Result<Option<Agent>>;

    /// The workspace default: most-recently-used agent, falling back to the
    /// first agent registered in the workspace.
    async fn default_for_workspace(&self, workspace_id: &str) -> Result<Option<Agent>>;
}

/// In-memory directory. Used by tests and single-process deployments; a
/// service-backed implementation slots in behind the same trait.
#[derive(Default)]
pub struct InMemoryDirectory {
    inner: RwLock<DirectoryInner>,
}

#[derive(Default)]
struct DirectoryInner {
    agents: HashMap<AgentId, Agent>,
    sessions: HashMap<SessionId, AgentId>,
    /// Insertion order per workspace, for a deterministic fallback default.
    workspace_order: HashMap<WorkspaceId, Vec<AgentId>>,
    /// Most-recently-used agent per workspace.
    recent: HashMap<WorkspaceId, AgentId>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an agent.
    pub fn insert(&self, agent: Agent) {
        let mut inner = self.inner.write();
        let order = inner
            .workspace_order
            .entry(agent.workspace_id.clone())
            .or_default();
        if !order.contains(&agent.id) {
            order.push(agent.id.clone());
        }
        inner.agents.insert(agent.id.clone(), agent);
    }

    /// Bind a session to an agent.
    pub fn bind_session(&self, session_id: impl Into<SessionId>, agent_id: impl Into<AgentId>) {
        self.inner
            .write()
            .sessions
            .insert(session_id.into(), agent_id.into());
    }

    /// Mark an agent as most-recently-used in its workspace.
    pub fn touch(&self, agent_id: &str) {
        let mut inner = self.inner.write();
        if let Some(workspace_id) = inner.agents.get(agent_id).map(|a| a.workspace_id.clone()) {
            inner.recent.insert(workspace_id, agent_id.to_string());
        }
    }

    /// Update an agent's maturity. Returns false if the agent is unknown.
    /// Callers are expected to invalidate the governance cache afterwards.
    pub fn set_maturity(&self, agent_id: &str, maturity: MaturityLevel) -> bool {
        let mut inner = self.inner.write();
        match inner.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.maturity = maturity;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AgentDirectory for InMemoryDirectory {
    async fn get(&self, agent_id: &str) -> Result<Option<Agent>> {
        Ok(self.inner.read().agents.get(agent_id).cloned())
    }

    async fn agent_for_session(&self, session_id: &str) -> Result<Option<Agent>> {
        let inner = self.inner.read();
        Ok(inner
            .sessions
            .get(session_id)
            .and_then(|id| inner.agents.get(id))
            .cloned())
    }

    async fn default_for_workspace(&self, workspace_id: &str) -> Result<Option<Agent>> {
        let inner = self.inner.read();
        if let Some(agent) = inner
            .recent
            .get(workspace_id)
            .and_then(|id| inner.agents.get(id))
        {
            return Ok(Some(agent.clone()));
        }
        Ok(inner
            .workspace_order
            .get(workspace_id)
            .and_then(|order| order.first())
            .and_then(|id| inner.agents.get(id))
            .cloned())
    }
}
