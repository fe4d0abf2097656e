use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use warden_config::schema::GovernanceConfig;
use warden_core::{MaturityLevel, Result};
use warden_registry::AgentDirectory;

use crate::action::ActionType;
use crate::cache::{CacheStats, GovernanceCache};

/// The outcome of an authorization check. Ephemeral and cache-backed —
/// always recomputable from the agent plus the static action table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceDecision {
    pub allowed: bool,
    pub reason: String,
    pub required_tier: Option<MaturityLevel>,
    pub actual_tier: Option<MaturityLevel>,
}

impl GovernanceDecision {
    fn allow(reason: impl Into<String>, required: MaturityLevel, actual: MaturityLevel) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            required_tier: Some(required),
            actual_tier: Some(actual),
        }
    }

    fn deny_unranked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            required_tier: None,
            actual_tier: None,
        }
    }

    fn bypass() -> Self {
        Self {
            allowed: true,
            reason: "emergency bypass active".into(),
            required_tier: None,
            actual_tier: None,
        }
    }
}

/// Call sites that can individually opt out of governance via config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    Chat,
    Proposals,
    Jobs,
}

impl CallSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Proposals => "proposals",
            Self::Jobs => "jobs",
        }
    }
}

/// Receives action outcomes for the upstream maturity-promotion process.
/// Promotion policy itself is out of scope — this is only the feed.
pub trait OutcomeSink: Send + Sync {
    fn record_outcome(&self, agent_id: &str, success: bool);
}

/// Default sink: per-agent success/failure counters the promotion process
/// can poll.
#[derive(Default)]
pub struct OutcomeRecorder {
    counts: Mutex<HashMap<String, (u64, u64)>>,
}

impl OutcomeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// (successes, failures) recorded for an agent.
    pub fn totals(&self, agent_id: &str) -> (u64, u64) {
        self.counts
            .lock()
            .get(agent_id)
            .copied()
            .unwrap_or((0, 0))
    }
}

impl OutcomeSink for OutcomeRecorder {
    fn record_outcome(&self, agent_id: &str, success: bool) {
        let mut counts = self.counts.lock();
        let entry = counts.entry(agent_id.to_string()).or_insert((0, 0));
        if success {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }
}

/// Authorizes agent actions against the static complexity table.
pub struct GovernanceService {
    directory: Arc<dyn AgentDirectory>,
    cache: Arc<GovernanceCache>,
    outcomes: Arc<dyn OutcomeSink>,
    check_chat: bool,
    check_proposals: bool,
    check_jobs: bool,
    emergency_bypass: bool,
}

impl GovernanceService {
    pub fn new(directory: Arc<dyn AgentDirectory>, config: &GovernanceConfig) -> Self {
        Self {
            directory,
            cache: Arc::new(GovernanceCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_capacity,
            )),
            outcomes: Arc::new(OutcomeRecorder::new()),
            check_chat: config.check_chat,
            check_proposals: config.check_proposals,
            check_jobs: config.check_jobs,
            emergency_bypass: config.emergency_bypass,
        }
    }

    pub fn with_outcome_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.outcomes = sink;
        self
    }

    /// Replace the cache (tests use a tiny TTL).
    pub fn with_cache(mut self, cache: Arc<GovernanceCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Whether a call site consults governance at all.
    pub fn is_enabled(&self, site: CallSite) -> bool {
        match site {
            CallSite::Chat => self.check_chat,
            CallSite::Proposals => self.check_proposals,
            CallSite::Jobs => self.check_jobs,
        }
    }

    /// Authorize an action for an agent. Fails closed on unknown action
    /// types and unknown agents. The fast path is a cache hit; a miss reads
    /// the registry and populates the cache.
    pub async fn can_perform_action(
        &self,
        agent_id: &str,
        action_type: &str,
    ) -> Result<GovernanceDecision> {
        // The bypass must be loud on every single check, so it sits in
        // front of the cache.
        if self.emergency_bypass {
            warn!(
                agent_id,
                action_type, "EMERGENCY BYPASS active — allowing without evaluation"
            );
            return Ok(GovernanceDecision::bypass());
        }

        let Some(action) = ActionType::parse(action_type) else {
            debug!(agent_id, action_type, "denying unrecognized action");
            return Ok(GovernanceDecision::deny_unranked(format!(
                "unrecognized action: {action_type}"
            )));
        };

        if let Some(decision) = self.cache.get(agent_id, action) {
            return Ok(decision);
        }

        let decision = self.evaluate(agent_id, action).await?;
        self.cache
            .insert(agent_id, action, decision.clone());
        Ok(decision)
    }

    /// Call-site-gated variant: a disabled site yields an allow decision
    /// marked as unchecked rather than consulting the table.
    pub async fn can_perform_action_at(
        &self,
        site: CallSite,
        agent_id: &str,
        action_type: &str,
    ) -> Result<GovernanceDecision> {
        if !self.is_enabled(site) {
            debug!(site = site.as_str(), agent_id, action_type, "governance disabled for call site");
            return Ok(GovernanceDecision {
                allowed: true,
                reason: format!("governance disabled for {}", site.as_str()),
                required_tier: None,
                actual_tier: None,
            });
        }
        self.can_perform_action(agent_id, action_type).await
    }

    /// Uncached evaluation against the registry and the action table.
    async fn evaluate(&self, agent_id: &str, action: ActionType) -> Result<GovernanceDecision> {
        let Some(agent) = self.directory.get(agent_id).await? else {
            debug!(agent_id, "denying: agent not in registry");
            return Ok(GovernanceDecision::deny_unranked(format!(
                "unknown agent: {agent_id}"
            )));
        };

        let required = action.required_maturity();
        let actual = agent.maturity;
        if actual >= required {
            Ok(GovernanceDecision::allow(
                format!("maturity {actual} meets {required} for '{action}'"),
                required,
                actual,
            ))
        } else {
            debug!(
                agent_id,
                action = %action,
                %required,
                %actual,
                "denying: insufficient maturity"
            );
            Ok(GovernanceDecision {
                allowed: false,
                reason: format!(
                    "insufficient maturity for '{action}': required: {required}, actual: {actual}"
                ),
                required_tier: Some(required),
                actual_tier: Some(actual),
            })
        }
    }

    /// Hard-failure variant of the check, for call sites that propagate
    /// errors instead of carrying a structured decision.
    pub async fn require(&self, agent_id: &str, action_type: &str) -> Result<()> {
        let decision = self.can_perform_action(agent_id, action_type).await?;
        if decision.allowed {
            return Ok(());
        }
        Err(warden_core::WardenError::PermissionDenied {
            action: action_type.to_string(),
            required: decision.required_tier.unwrap_or(MaturityLevel::Autonomous),
            actual: decision.actual_tier.unwrap_or(MaturityLevel::Student),
        })
    }

    /// Record an action outcome for maturity promotion. Always effectful;
    /// never called on the authorization path.
    pub fn record_outcome(&self, agent_id: &str, success: bool) {
        self.outcomes.record_outcome(agent_id, success);
    }

    /// Best-effort invalidation after an explicit maturity change.
    pub fn invalidate_agent(&self, agent_id: &str) {
        self.cache.invalidate_agent(agent_id);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
