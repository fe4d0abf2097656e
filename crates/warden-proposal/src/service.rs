use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use warden_core::{JobId, Result, WardenError};
use warden_governance::{ActionType, CallSite, GovernanceService};
use warden_ledger::{ExecutionStatus, LedgerStore};
use warden_queue::{Job, JobHandler, JobKind, QueueManager};

use crate::episode::synthesize_episode;
use crate::executor::ExecutorSet;
use crate::proposal::{Proposal, ProposalDraft, ProposalStatus};

/// Drives the proposal pipeline:
/// `propose → governance check → dispatch → finalize → synthesize episode`.
pub struct ProposalService {
    proposals: DashMap<String, Proposal>,
    governance: Arc<GovernanceService>,
    ledger: Arc<LedgerStore>,
    executors: Arc<ExecutorSet>,
}

impl ProposalService {
    pub fn new(
        governance: Arc<GovernanceService>,
        ledger: Arc<LedgerStore>,
        executors: Arc<ExecutorSet>,
    ) -> Self {
        Self {
            proposals: DashMap::new(),
            governance,
            ledger,
            executors,
        }
    }

    /// Create a pending proposal.
    pub fn propose(&self, draft: ProposalDraft) -> Proposal {
        let proposal = Proposal::new(draft);
        info!(
            proposal_id = %proposal.id,
            agent_id = %proposal.agent_id,
            action = %proposal.proposed_action.action_type,
            "proposal created"
        );
        self.proposals.insert(proposal.id.clone(), proposal.clone());
        proposal
    }

    pub fn get(&self, proposal_id: &str) -> Option<Proposal> {
        self.proposals.get(proposal_id).map(|p| p.clone())
    }

    /// Approve a pending proposal (human or policy approval upstream).
    pub fn approve(&self, proposal_id: &str) -> Result<Proposal> {
        self.transition(proposal_id, ProposalStatus::Approved, None)
    }

    /// Reject a pending proposal with a reason.
    pub fn reject(&self, proposal_id: &str, reason: &str) -> Result<Proposal> {
        self.transition(
            proposal_id,
            ProposalStatus::Rejected,
            Some(reason.to_string()),
        )
    }

    /// Cancel a proposal. Succeeds from any non-terminal state; once the
    /// proposal reached a terminal state the cancellation is refused.
    pub fn cancel(&self, proposal_id: &str) -> Result<bool> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| WardenError::ProposalNotFound(proposal_id.to_string()))?;
        if entry.status.is_terminal() {
            info!(%proposal_id, status = %entry.status, "cancel refused — proposal already terminal");
            return Ok(false);
        }
        entry.status = ProposalStatus::Cancelled;
        entry.status_reason = Some("cancelled by request".into());
        entry.updated_at = Utc::now();
        info!(%proposal_id, "proposal cancelled");
        Ok(true)
    }

    /// Execute an approved proposal inline: governance gate, ledger row,
    /// executor dispatch, finalization, episode.
    pub async fn execute(&self, proposal_id: &str) -> Result<Proposal> {
        let proposal = self
            .get(proposal_id)
            .ok_or_else(|| WardenError::ProposalNotFound(proposal_id.to_string()))?;
        if proposal.status != ProposalStatus::Approved {
            return Err(WardenError::InvalidTransition {
                from: proposal.status.as_str().to_string(),
                to: ProposalStatus::Executing.as_str().to_string(),
            });
        }

        let action_type = proposal.proposed_action.action_type.clone();
        let decision = self
            .governance
            .can_perform_action_at(CallSite::Proposals, &proposal.agent_id, &action_type)
            .await?;
        if !decision.allowed {
            info!(
                %proposal_id,
                agent_id = %proposal.agent_id,
                action = %action_type,
                reason = %decision.reason,
                "proposal rejected by governance"
            );
            return self.transition(
                proposal_id,
                ProposalStatus::Rejected,
                Some(decision.reason),
            );
        }

        // A cancellation that already landed wins here: approved → executing
        // is refused and surfaces as InvalidTransition.
        let proposal = self.transition(proposal_id, ProposalStatus::Executing, None)?;

        // Audit row goes in before any side effect starts.
        let input_summary = format!(
            "proposal={} type={} action={}",
            proposal.id, proposal.proposal_type, action_type
        );
        let execution_id = self.ledger.begin_execution(
            &proposal.agent_id,
            &proposal.workspace_id,
            &input_summary,
            "proposal",
        )?;

        let outcome = match ActionType::parse(&action_type).and_then(|a| a.executor_kind()) {
            Some(kind) => {
                self.executors
                    .dispatch(kind, &proposal.effective_parameters())
                    .await
            }
            None => Err(WardenError::Executor {
                kind: "none".into(),
                reason: format!("action '{action_type}' has no executor"),
            }),
        };

        self.finalize(proposal_id, &execution_id, outcome)
    }

    /// Enqueue an approved proposal for out-of-band execution.
    pub async fn execute_async(
        &self,
        proposal_id: &str,
        queue: &QueueManager,
    ) -> Result<JobId> {
        let proposal = self
            .get(proposal_id)
            .ok_or_else(|| WardenError::ProposalNotFound(proposal_id.to_string()))?;
        if proposal.status != ProposalStatus::Approved {
            return Err(WardenError::InvalidTransition {
                from: proposal.status.as_str().to_string(),
                to: ProposalStatus::Executing.as_str().to_string(),
            });
        }
        queue
            .enqueue_now(
                JobKind::ProposalExecution,
                serde_json::json!({ "proposal_id": proposal.id }),
                &proposal.agent_id,
            )
            .await
    }

    /// Settle a dispatched proposal: terminal status, ledger finish,
    /// episode, outcome feed.
    fn finalize(
        &self,
        proposal_id: &str,
        execution_id: &str,
        outcome: Result<serde_json::Value>,
    ) -> Result<Proposal> {
        let (success, target, output, error_msg) = match &outcome {
            Ok(value) => (
                true,
                ProposalStatus::Completed,
                Some(summarize_output(value)),
                None,
            ),
            Err(e) => (
                false,
                ProposalStatus::Failed,
                None,
                Some(e.public_message()),
            ),
        };

        // A cancellation may have won the race while the executor ran.
        let Some(proposal) =
            self.try_transition(proposal_id, target, error_msg.clone())?
        else {
            info!(%proposal_id, "proposal cancelled during dispatch — discarding outcome");
            self.ledger.finish_execution(
                execution_id,
                ExecutionStatus::Cancelled,
                None,
                Some("cancelled during dispatch"),
            )?;
            return self
                .get(proposal_id)
                .ok_or_else(|| WardenError::ProposalNotFound(proposal_id.to_string()));
        };

        let ledger_status = if success {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        self.ledger.finish_execution(
            execution_id,
            ledger_status,
            output.as_deref(),
            error_msg.as_deref(),
        )?;

        let episode = synthesize_episode(&proposal, success, error_msg.as_deref());
        if let Err(e) = self.ledger.insert_episode(&episode) {
            warn!(%proposal_id, error = %e, "failed to persist episode");
        }

        // Outcome feed for maturity promotion — deliberately off the
        // authorization path.
        self.governance.record_outcome(&proposal.agent_id, success);

        info!(
            %proposal_id,
            status = %proposal.status,
            success,
            "proposal finalized"
        );
        Ok(proposal)
    }

    fn transition(
        &self,
        proposal_id: &str,
        to: ProposalStatus,
        reason: Option<String>,
    ) -> Result<Proposal> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| WardenError::ProposalNotFound(proposal_id.to_string()))?;
        if !entry.status.can_transition(to) {
            return Err(WardenError::InvalidTransition {
                from: entry.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        entry.status = to;
        entry.status_reason = reason;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Like [`Self::transition`] but a refused transition yields `Ok(None)`
    /// instead of an error — used where losing a race is a normal outcome.
    fn try_transition(
        &self,
        proposal_id: &str,
        to: ProposalStatus,
        reason: Option<String>,
    ) -> Result<Option<Proposal>> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| WardenError::ProposalNotFound(proposal_id.to_string()))?;
        if !entry.status.can_transition(to) {
            return Ok(None);
        }
        entry.status = to;
        entry.status_reason = reason;
        entry.updated_at = Utc::now();
        Ok(Some(entry.clone()))
    }
}

fn summarize_output(value: &serde_json::Value) -> String {
    let rendered = value.to_string();
    if rendered.len() > 400 {
        let truncated: String = rendered.chars().take(400).collect();
        format!("{truncated}…")
    } else {
        rendered
    }
}

/// Worker-side handler that executes proposals queued via
/// [`ProposalService::execute_async`].
pub struct ProposalExecutionHandler {
    service: Arc<ProposalService>,
}

impl ProposalExecutionHandler {
    pub fn new(service: Arc<ProposalService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for ProposalExecutionHandler {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value> {
        let proposal_id = job
            .payload
            .get("proposal_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WardenError::JobExecutionFailed {
                job_id: job.id.clone(),
                reason: "payload missing proposal_id".into(),
            })?;
        let proposal = self.service.execute(proposal_id).await?;
        Ok(serde_json::json!({
            "proposal_id": proposal.id,
            "status": proposal.status.as_str(),
        }))
    }
}
