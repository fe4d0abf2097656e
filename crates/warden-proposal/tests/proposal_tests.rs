#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use warden_config::schema::GovernanceConfig;
    use warden_core::{Agent, MaturityLevel, WardenError};
    use warden_governance::{GovernanceService, OutcomeRecorder, OutcomeSink};
    use warden_ledger::{ExecutionStatus, LedgerStore};
    use warden_proposal::{
        ExecutorSet, MockExecutor, Proposal, ProposalDraft, ProposalExecutionHandler,
        ProposalService, ProposalStatus, extract_topics, format_outcome,
    };
    use warden_queue::{InMemoryBroker, JobKind, JobStatus, QueueManager, Worker};

    fn draft(action_type: &str) -> ProposalDraft {
        ProposalDraft {
            agent_id: "a1".into(),
            workspace_id: "ws-1".into(),
            proposal_type: "automation".into(),
            title: "Submit the quarterly report".into(),
            reasoning: "The report deadline approaches and the numbers are ready".into(),
            action_type: action_type.into(),
            parameters: serde_json::json!({"target": "reports"}),
            modifications: vec![],
        }
    }

    struct Harness {
        service: Arc<ProposalService>,
        ledger: Arc<LedgerStore>,
        outcomes: Arc<OutcomeRecorder>,
        browser: Arc<MockExecutor>,
    }

    fn harness(maturity: MaturityLevel, browser: MockExecutor) -> Harness {
        let dir = Arc::new(warden_registry::InMemoryDirectory::new());
        dir.insert(Agent::new("a1", "Agent One", maturity, "ws-1"));

        let outcomes = Arc::new(OutcomeRecorder::new());
        let governance = Arc::new(
            GovernanceService::new(dir, &GovernanceConfig::default())
                .with_outcome_sink(outcomes.clone() as Arc<dyn OutcomeSink>),
        );
        let ledger = Arc::new(LedgerStore::open_in_memory().unwrap());
        let browser = Arc::new(browser);
        let executors = Arc::new(ExecutorSet::new(
            browser.clone(),
            Arc::new(MockExecutor::new("integration")),
            Arc::new(MockExecutor::new("workflow")),
            Arc::new(MockExecutor::new("agent")),
        ));
        let service = Arc::new(ProposalService::new(governance, ledger.clone(), executors));
        Harness {
            service,
            ledger,
            outcomes,
            browser,
        }
    }

    // ── State machine ──────────────────────────────────────────

    #[test]
    fn test_status_transitions() {
        use ProposalStatus::*;
        assert!(Pending.can_transition(Approved));
        assert!(Pending.can_transition(Rejected));
        assert!(Pending.can_transition(Cancelled));
        assert!(Approved.can_transition(Executing));
        assert!(Approved.can_transition(Cancelled));
        assert!(Executing.can_transition(Completed));
        assert!(Executing.can_transition(Failed));
        assert!(Executing.can_transition(Cancelled));

        assert!(!Pending.can_transition(Executing));
        assert!(!Approved.can_transition(Completed));
        for terminal in [Rejected, Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition(Approved));
            assert!(!terminal.can_transition(Executing));
        }
    }

    // ── Modification overlays ──────────────────────────────────

    #[test]
    fn test_effective_parameters_applies_edits_in_order() {
        let mut d = draft("browser_action");
        d.modifications = vec![
            "priority: low".into(),
            "due_date: 2026-01-01".into(),
            "priority: high".into(), // later edit wins
            "not a modification".into(),
        ];
        let proposal = Proposal::new(d);
        let params = proposal.effective_parameters();
        assert_eq!(params["target"], "reports");
        assert_eq!(params["priority"], "high");
        assert_eq!(params["due_date"], "2026-01-01");
        assert!(params.get("not a modification").is_none());
    }

    #[test]
    fn test_effective_parameters_with_non_object_base() {
        let mut d = draft("browser_action");
        d.parameters = serde_json::json!("just a string");
        d.modifications = vec!["key: value".into()];
        let params = Proposal::new(d).effective_parameters();
        assert_eq!(params["key"], "value");
    }

    // ── Outcome formatting / topics ────────────────────────────

    #[test]
    fn test_outcome_summary_renders_modifications_verbatim() {
        let mut d = draft("browser_action");
        d.modifications = vec!["priority: high".into(), "due_date: 2026-01-01".into()];
        let proposal = Proposal::new(d);

        let summary = format_outcome(&proposal, true, None);
        assert!(summary.contains("priority: high"));
        assert!(summary.contains("due_date: 2026-01-01"));
        assert!(summary.contains("completed successfully"));

        let failed = format_outcome(&proposal, false, Some("executor timeout"));
        assert!(failed.contains("failed"));
        assert!(failed.contains("executor timeout"));
        assert!(failed.contains("priority: high"));
    }

    #[test]
    fn test_topics_priority_fields_first() {
        let proposal = Proposal::new(draft("browser_action"));
        let topics = extract_topics(&proposal);
        assert_eq!(topics[0], "automation");
        assert_eq!(topics[1], "browser_action");
        assert!(topics.len() <= 5);
    }

    #[test]
    fn test_topics_capped_at_five_with_priority_kept() {
        let mut d = draft("browser_action");
        d.title = "gigantic enormous tremendous colossal mountainous staggering".into();
        d.reasoning = "monumental prodigious astronomical gargantuan".into();
        let topics = extract_topics(&Proposal::new(d));
        assert_eq!(topics.len(), 5);
        assert_eq!(topics[0], "automation");
        assert_eq!(topics[1], "browser_action");
        // Three derived topics, no more
        assert_eq!(topics[2..].len(), 3);
    }

    #[test]
    fn test_topics_skip_short_words_and_duplicates() {
        let mut d = draft("browser_action");
        d.title = "do it now fast stat".into(); // all ≤4 chars
        d.reasoning = "automation automation".into(); // dup of proposal_type
        let topics = extract_topics(&Proposal::new(d));
        assert_eq!(topics, vec!["automation", "browser_action"]);
    }

    // ── Pipeline ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_propose_approve_execute_completes() {
        let h = harness(
            MaturityLevel::Supervised,
            MockExecutor::new("browser").with_result(serde_json::json!({"ok": true})),
        );
        let mut d = draft("browser_action");
        d.modifications = vec!["priority: high".into()];
        let proposal = h.service.propose(d);
        assert_eq!(proposal.status, ProposalStatus::Pending);

        h.service.approve(&proposal.id).unwrap();
        let done = h.service.execute(&proposal.id).await.unwrap();
        assert_eq!(done.status, ProposalStatus::Completed);

        // The executor saw the overlaid parameters
        assert_eq!(h.browser.call_count(), 1);
        let params = h.browser.calls.lock()[0].clone();
        assert_eq!(params["priority"], "high");
        assert_eq!(params["target"], "reports");

        // Exactly one finalized ledger row
        let rows = h.ledger.executions_for("a1", "ws-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ExecutionStatus::Completed);
        assert!(rows[0].duration_ms.is_some());

        // Episode synthesized once, success outcome fed to promotion
        let episodes = h.ledger.episodes_for_proposal(&proposal.id).unwrap();
        assert_eq!(episodes.len(), 1);
        assert!(episodes[0].success);
        assert_eq!(episodes[0].topics[0], "automation");
        assert_eq!(h.outcomes.totals("a1"), (1, 0));
    }

    #[tokio::test]
    async fn test_governance_denial_rejects_proposal() {
        let h = harness(MaturityLevel::Student, MockExecutor::new("browser"));
        let proposal = h.service.propose(draft("browser_action"));
        h.service.approve(&proposal.id).unwrap();

        let rejected = h.service.execute(&proposal.id).await.unwrap();
        assert_eq!(rejected.status, ProposalStatus::Rejected);
        let reason = rejected.status_reason.unwrap();
        assert!(reason.contains("required: SUPERVISED, actual: STUDENT"));

        // Nothing was dispatched, no ledger row, no outcome recorded
        assert_eq!(h.browser.call_count(), 0);
        assert!(h.ledger.executions_for("a1", "ws-1").unwrap().is_empty());
        assert_eq!(h.outcomes.totals("a1"), (0, 0));
    }

    #[tokio::test]
    async fn test_executor_failure_fails_proposal() {
        let h = harness(
            MaturityLevel::Supervised,
            MockExecutor::new("browser").with_error("page crashed"),
        );
        let proposal = h.service.propose(draft("browser_action"));
        h.service.approve(&proposal.id).unwrap();

        let failed = h.service.execute(&proposal.id).await.unwrap();
        assert_eq!(failed.status, ProposalStatus::Failed);
        assert!(failed.status_reason.unwrap().contains("page crashed"));

        let rows = h.ledger.executions_for("a1", "ws-1").unwrap();
        assert_eq!(rows[0].status, ExecutionStatus::Failed);

        let episodes = h.ledger.episodes_for_proposal(&proposal.id).unwrap();
        assert_eq!(episodes.len(), 1);
        assert!(!episodes[0].success);
        assert_eq!(h.outcomes.totals("a1"), (0, 1));
    }

    #[tokio::test]
    async fn test_action_without_executor_fails() {
        let h = harness(MaturityLevel::Autonomous, MockExecutor::new("browser"));
        let proposal = h.service.propose(draft("stream_chat"));
        h.service.approve(&proposal.id).unwrap();

        let failed = h.service.execute(&proposal.id).await.unwrap();
        assert_eq!(failed.status, ProposalStatus::Failed);
        assert!(failed.status_reason.unwrap().contains("no executor"));
    }

    #[tokio::test]
    async fn test_execute_requires_approval() {
        let h = harness(MaturityLevel::Supervised, MockExecutor::new("browser"));
        let proposal = h.service.propose(draft("browser_action"));

        let err = h.service.execute(&proposal.id).await.unwrap_err();
        assert!(matches!(err, WardenError::InvalidTransition { .. }));
    }

    // ── Cancellation ───────────────────────────────────────────

    #[tokio::test]
    async fn test_cancel_before_dispatch_blocks_execution() {
        let h = harness(MaturityLevel::Supervised, MockExecutor::new("browser"));
        let proposal = h.service.propose(draft("browser_action"));
        h.service.approve(&proposal.id).unwrap();

        assert!(h.service.cancel(&proposal.id).unwrap());
        assert_eq!(
            h.service.get(&proposal.id).unwrap().status,
            ProposalStatus::Cancelled
        );

        // Execution now refuses: the proposal is no longer approved
        let err = h.service.execute(&proposal.id).await.unwrap_err();
        assert!(matches!(err, WardenError::InvalidTransition { .. }));
        assert_eq!(h.browser.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_terminal_is_refused() {
        let h = harness(
            MaturityLevel::Supervised,
            MockExecutor::new("browser").with_result(serde_json::json!({})),
        );
        let proposal = h.service.propose(draft("browser_action"));
        h.service.approve(&proposal.id).unwrap();
        h.service.execute(&proposal.id).await.unwrap();

        assert!(!h.service.cancel(&proposal.id).unwrap());
        assert_eq!(
            h.service.get(&proposal.id).unwrap().status,
            ProposalStatus::Completed
        );
    }

    // ── Out-of-band execution ──────────────────────────────────

    #[tokio::test]
    async fn test_execute_async_through_queue() {
        let h = harness(
            MaturityLevel::Supervised,
            MockExecutor::new("browser").with_result(serde_json::json!({"ok": true})),
        );
        let broker = Arc::new(InMemoryBroker::with_defaults());
        let manager = QueueManager::new(broker.clone(), h.ledger.clone());

        let proposal = h.service.propose(draft("browser_action"));
        h.service.approve(&proposal.id).unwrap();
        let job_id = h
            .service
            .execute_async(&proposal.id, &manager)
            .await
            .unwrap();
        assert_eq!(
            manager.get_job_status(&job_id).await.unwrap(),
            JobStatus::Queued
        );
        // Still approved until the worker picks it up
        assert_eq!(
            h.service.get(&proposal.id).unwrap().status,
            ProposalStatus::Approved
        );

        let worker = Worker::new(broker, h.ledger.clone(), Duration::from_millis(10)).register(
            JobKind::ProposalExecution,
            Arc::new(ProposalExecutionHandler::new(h.service.clone())),
        );
        worker.tick(chrono::Utc::now()).await.unwrap();

        assert_eq!(
            h.service.get(&proposal.id).unwrap().status,
            ProposalStatus::Completed
        );
        assert_eq!(
            manager.get_job_status(&job_id).await.unwrap(),
            JobStatus::Completed
        );
        let record = h.ledger.find_job_result(&job_id).unwrap().unwrap();
        assert!(record.ok);
        assert!(record.output.unwrap().contains("completed"));
    }
}
