use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use warden_core::{Result, WardenError};
use warden_governance::ExecutorKind;

/// Call contract for an external executor. Implementations live outside
/// this core — browser automation, integration surfaces, the workflow
/// engine, and sub-agent spawning all satisfy the same thin interface.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, params: &serde_json::Value) -> Result<serde_json::Value>;
}

/// The four executor call-outs, one per [`ExecutorKind`].
pub struct ExecutorSet {
    browser: Arc<dyn ActionExecutor>,
    integration: Arc<dyn ActionExecutor>,
    workflow: Arc<dyn ActionExecutor>,
    agent: Arc<dyn ActionExecutor>,
}

impl ExecutorSet {
    pub fn new(
        browser: Arc<dyn ActionExecutor>,
        integration: Arc<dyn ActionExecutor>,
        workflow: Arc<dyn ActionExecutor>,
        agent: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            browser,
            integration,
            workflow,
            agent,
        }
    }

    /// Exhaustive selection — adding an executor kind without wiring an
    /// executor is a compile error.
    pub fn executor_for(&self, kind: ExecutorKind) -> &Arc<dyn ActionExecutor> {
        match kind {
            ExecutorKind::Browser => &self.browser,
            ExecutorKind::Integration => &self.integration,
            ExecutorKind::Workflow => &self.workflow,
            ExecutorKind::Agent => &self.agent,
        }
    }

    pub async fn dispatch(
        &self,
        kind: ExecutorKind,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        debug!(executor = %kind, "dispatching action");
        self.executor_for(kind).execute(params).await
    }
}

/// Placeholder for an executor with no configured collaborator endpoint.
/// Dispatching to it fails cleanly instead of panicking at wiring time.
pub struct UnconfiguredExecutor {
    kind: ExecutorKind,
}

impl UnconfiguredExecutor {
    pub fn new(kind: ExecutorKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ActionExecutor for UnconfiguredExecutor {
    async fn execute(&self, _params: &serde_json::Value) -> Result<serde_json::Value> {
        Err(WardenError::Executor {
            kind: self.kind.as_str().to_string(),
            reason: "no endpoint configured for this executor".into(),
        })
    }
}

/// HTTP call-out executor: POSTs the parameters to a collaborator endpoint
/// and returns its JSON response.
pub struct HttpCallout {
    client: reqwest::Client,
    endpoint: String,
    kind: ExecutorKind,
}

impl HttpCallout {
    pub fn new(kind: ExecutorKind, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            kind,
        }
    }
}

#[async_trait]
impl ActionExecutor for HttpCallout {
    async fn execute(&self, params: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(params)
            .send()
            .await
            .map_err(|e| WardenError::Executor {
                kind: self.kind.as_str().to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(WardenError::Executor {
                kind: self.kind.as_str().to_string(),
                reason: format!("endpoint returned {}", response.status()),
            });
        }

        response.json().await.map_err(|e| WardenError::Executor {
            kind: self.kind.as_str().to_string(),
            reason: format!("invalid response body: {e}"),
        })
    }
}
