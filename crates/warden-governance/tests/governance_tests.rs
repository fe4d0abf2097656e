#[cfg(test)]
mod tests {
    // ── Action table ───────────────────────────────────────────

    mod action {
        use warden_core::MaturityLevel;
        use warden_governance::{ActionType, ExecutorKind};

        #[test]
        fn test_parse_known_actions() {
            assert_eq!(
                ActionType::parse("present_chart"),
                Some(ActionType::PresentChart)
            );
            assert_eq!(ActionType::parse("submit_form"), Some(ActionType::SubmitForm));
            assert_eq!(ActionType::parse("llm_stream"), Some(ActionType::LlmStream));
        }

        #[test]
        fn test_parse_unknown_is_none() {
            assert_eq!(ActionType::parse("rm_rf_slash"), None);
            assert_eq!(ActionType::parse(""), None);
            assert_eq!(ActionType::parse("Present_Chart"), None);
        }

        #[test]
        fn test_complexity_table() {
            assert_eq!(ActionType::PresentChart.complexity(), 1);
            assert_eq!(ActionType::StreamChat.complexity(), 2);
            assert_eq!(ActionType::PresentForm.complexity(), 2);
            assert_eq!(ActionType::SubmitForm.complexity(), 3);
            assert_eq!(ActionType::LlmStream.complexity(), 2);
        }

        #[test]
        fn test_required_maturity_table() {
            assert_eq!(
                ActionType::PresentChart.required_maturity(),
                MaturityLevel::Student
            );
            assert_eq!(
                ActionType::StreamChat.required_maturity(),
                MaturityLevel::Intern
            );
            assert_eq!(
                ActionType::SubmitForm.required_maturity(),
                MaturityLevel::Supervised
            );
            assert_eq!(
                ActionType::AgentAction.required_maturity(),
                MaturityLevel::Autonomous
            );
        }

        #[test]
        fn test_executor_kinds() {
            assert_eq!(
                ActionType::BrowserAction.executor_kind(),
                Some(ExecutorKind::Browser)
            );
            assert_eq!(
                ActionType::WorkflowAction.executor_kind(),
                Some(ExecutorKind::Workflow)
            );
            assert_eq!(ActionType::StreamChat.executor_kind(), None);
        }

        #[test]
        fn test_roundtrip_all() {
            for action in ActionType::ALL {
                assert_eq!(ActionType::parse(action.as_str()), Some(action));
            }
        }
    }

    // ── Cache ──────────────────────────────────────────────────

    mod cache {
        use std::time::Duration;
        use warden_core::MaturityLevel;
        use warden_governance::{ActionType, GovernanceCache, GovernanceDecision};

        fn decision(allowed: bool) -> GovernanceDecision {
            GovernanceDecision {
                allowed,
                reason: "test".into(),
                required_tier: Some(MaturityLevel::Intern),
                actual_tier: Some(MaturityLevel::Supervised),
            }
        }

        #[test]
        fn test_hit_and_miss_counters() {
            let cache = GovernanceCache::new(Duration::from_secs(60), 16);
            assert!(cache.get("a1", ActionType::StreamChat).is_none());
            cache.insert("a1", ActionType::StreamChat, decision(true));
            assert!(cache.get("a1", ActionType::StreamChat).is_some());
            assert!(cache.get("a1", ActionType::SubmitForm).is_none());

            let stats = cache.stats();
            assert_eq!(stats.hits, 1);
            assert_eq!(stats.misses, 2);
            assert_eq!(stats.size, 1);
        }

        #[test]
        fn test_ttl_expiry() {
            let cache = GovernanceCache::new(Duration::from_millis(10), 16);
            cache.insert("a1", ActionType::StreamChat, decision(true));
            assert!(cache.get("a1", ActionType::StreamChat).is_some());
            std::thread::sleep(Duration::from_millis(25));
            assert!(cache.get("a1", ActionType::StreamChat).is_none());
            assert_eq!(cache.stats().size, 0);
        }

        #[test]
        fn test_lru_eviction_at_capacity() {
            let cache = GovernanceCache::new(Duration::from_secs(60), 2);
            cache.insert("a1", ActionType::StreamChat, decision(true));
            cache.insert("a2", ActionType::StreamChat, decision(true));
            // Touch a1 so a2 becomes least recently used
            assert!(cache.get("a1", ActionType::StreamChat).is_some());
            cache.insert("a3", ActionType::StreamChat, decision(true));

            assert!(cache.get("a1", ActionType::StreamChat).is_some());
            assert!(cache.get("a2", ActionType::StreamChat).is_none());
            assert!(cache.get("a3", ActionType::StreamChat).is_some());
            assert_eq!(cache.stats().evictions, 1);
        }

        #[test]
        fn test_invalidate_agent_drops_all_actions() {
            let cache = GovernanceCache::new(Duration::from_secs(60), 16);
            cache.insert("a1", ActionType::StreamChat, decision(true));
            cache.insert("a1", ActionType::SubmitForm, decision(false));
            cache.insert("a2", ActionType::StreamChat, decision(true));

            cache.invalidate_agent("a1");
            assert!(cache.get("a1", ActionType::StreamChat).is_none());
            assert!(cache.get("a1", ActionType::SubmitForm).is_none());
            assert!(cache.get("a2", ActionType::StreamChat).is_some());
        }

        #[test]
        fn test_heavy_reaccess_stays_bounded() {
            let cache = GovernanceCache::new(Duration::from_secs(60), 4);
            cache.insert("a1", ActionType::StreamChat, decision(true));
            for _ in 0..10_000 {
                assert!(cache.get("a1", ActionType::StreamChat).is_some());
            }
            assert_eq!(cache.stats().size, 1);
        }
    }

    // ── Service ────────────────────────────────────────────────

    mod service {
        use std::sync::Arc;
        use std::time::Duration;
        use warden_config::schema::GovernanceConfig;
        use warden_core::{Agent, MaturityLevel};
        use warden_governance::{
            CallSite, GovernanceCache, GovernanceService, OutcomeRecorder, OutcomeSink,
        };
        use warden_registry::InMemoryDirectory;

        fn setup(maturity: MaturityLevel) -> (Arc<InMemoryDirectory>, GovernanceService) {
            let dir = Arc::new(InMemoryDirectory::new());
            dir.insert(Agent::new("a1", "Agent One", maturity, "ws-1"));
            let service = GovernanceService::new(dir.clone(), &GovernanceConfig::default());
            (dir, service)
        }

        #[tokio::test]
        async fn test_allowed_iff_maturity_meets_tier() {
            for (maturity, action, expected) in [
                (MaturityLevel::Student, "present_chart", true),
                (MaturityLevel::Student, "stream_chat", false),
                (MaturityLevel::Intern, "stream_chat", true),
                (MaturityLevel::Intern, "submit_form", false),
                (MaturityLevel::Supervised, "submit_form", true),
                (MaturityLevel::Supervised, "agent_action", false),
                (MaturityLevel::Autonomous, "agent_action", true),
            ] {
                let (_, service) = setup(maturity);
                let decision = service.can_perform_action("a1", action).await.unwrap();
                assert_eq!(
                    decision.allowed, expected,
                    "maturity {maturity} action {action}"
                );
            }
        }

        #[tokio::test]
        async fn test_student_submit_form_denial_cites_tiers() {
            let (_, service) = setup(MaturityLevel::Student);
            let decision = service.can_perform_action("a1", "submit_form").await.unwrap();
            assert!(!decision.allowed);
            assert!(decision.reason.contains("required: SUPERVISED, actual: STUDENT"));
            assert_eq!(decision.required_tier, Some(MaturityLevel::Supervised));
            assert_eq!(decision.actual_tier, Some(MaturityLevel::Student));
        }

        #[tokio::test]
        async fn test_unrecognized_action_fails_closed() {
            let (_, service) = setup(MaturityLevel::Autonomous);
            let decision = service
                .can_perform_action("a1", "format_disk")
                .await
                .unwrap();
            assert!(!decision.allowed);
            assert!(decision.reason.contains("unrecognized action"));
            assert!(decision.required_tier.is_none());
        }

        #[tokio::test]
        async fn test_unknown_agent_fails_closed() {
            let (_, service) = setup(MaturityLevel::Autonomous);
            let decision = service
                .can_perform_action("ghost", "stream_chat")
                .await
                .unwrap();
            assert!(!decision.allowed);
            assert!(decision.reason.contains("unknown agent"));
        }

        #[tokio::test]
        async fn test_second_check_is_served_from_cache() {
            let (_, service) = setup(MaturityLevel::Intern);
            let first = service.can_perform_action("a1", "stream_chat").await.unwrap();
            let second = service.can_perform_action("a1", "stream_chat").await.unwrap();

            assert_eq!(first.allowed, second.allowed);
            assert_eq!(first.reason, second.reason);
            let stats = service.cache_stats();
            assert_eq!(stats.hits, 1);
            assert_eq!(stats.misses, 1);
        }

        #[tokio::test]
        async fn test_concurrent_checks_agree_and_share_one_evaluation() {
            let dir = Arc::new(InMemoryDirectory::new());
            dir.insert(Agent::new("a1", "A", MaturityLevel::Intern, "ws-1"));
            let service = Arc::new(GovernanceService::new(dir, &GovernanceConfig::default()));

            let (first, second) = tokio::join!(
                service.can_perform_action("a1", "stream_chat"),
                service.can_perform_action("a1", "stream_chat"),
            );
            let first = first.unwrap();
            let second = second.unwrap();
            assert_eq!(first.allowed, second.allowed);
            assert_eq!(first.required_tier, second.required_tier);

            // Within the TTL only the first check paid for a full evaluation
            let stats = service.cache_stats();
            assert_eq!(stats.misses, 1);
            assert_eq!(stats.hits, 1);
        }

        #[tokio::test]
        async fn test_cached_decision_matches_fresh_while_maturity_unchanged() {
            let (_, service) = setup(MaturityLevel::Supervised);
            let cached = service.can_perform_action("a1", "submit_form").await.unwrap();
            // A fresh evaluation of the same (agent, action) must agree
            let fresh_service = {
                let dir = Arc::new(InMemoryDirectory::new());
                dir.insert(Agent::new(
                    "a1",
                    "Agent One",
                    MaturityLevel::Supervised,
                    "ws-1",
                ));
                GovernanceService::new(dir, &GovernanceConfig::default())
            };
            let fresh = fresh_service
                .can_perform_action("a1", "submit_form")
                .await
                .unwrap();
            assert_eq!(cached.allowed, fresh.allowed);
            assert_eq!(cached.required_tier, fresh.required_tier);
            assert_eq!(cached.actual_tier, fresh.actual_tier);
        }

        #[tokio::test]
        async fn test_maturity_change_with_invalidation() {
            let (dir, service) = setup(MaturityLevel::Student);
            let before = service.can_perform_action("a1", "stream_chat").await.unwrap();
            assert!(!before.allowed);

            dir.set_maturity("a1", MaturityLevel::Intern);
            service.invalidate_agent("a1");

            let after = service.can_perform_action("a1", "stream_chat").await.unwrap();
            assert!(after.allowed);
        }

        #[tokio::test]
        async fn test_stale_entry_expires_after_ttl() {
            let dir = Arc::new(InMemoryDirectory::new());
            dir.insert(Agent::new("a1", "A", MaturityLevel::Student, "ws-1"));
            let service = GovernanceService::new(dir.clone(), &GovernanceConfig::default())
                .with_cache(Arc::new(GovernanceCache::new(
                    Duration::from_millis(10),
                    16,
                )));

            assert!(!service.can_perform_action("a1", "stream_chat").await.unwrap().allowed);
            dir.set_maturity("a1", MaturityLevel::Autonomous);
            // Without invalidation the stale denial may be served until TTL...
            tokio::time::sleep(Duration::from_millis(25)).await;
            // ...after which a fresh evaluation sees the promotion.
            assert!(service.can_perform_action("a1", "stream_chat").await.unwrap().allowed);
        }

        #[tokio::test]
        async fn test_emergency_bypass_allows_everything() {
            let dir = Arc::new(InMemoryDirectory::new());
            dir.insert(Agent::new("a1", "A", MaturityLevel::Student, "ws-1"));
            let config = GovernanceConfig {
                emergency_bypass: true,
                ..Default::default()
            };
            let service = GovernanceService::new(dir, &config);

            let decision = service.can_perform_action("a1", "agent_action").await.unwrap();
            assert!(decision.allowed);
            assert!(decision.reason.contains("emergency bypass"));
            // Even unknown actions pass under the bypass
            let decision = service.can_perform_action("a1", "anything_at_all").await.unwrap();
            assert!(decision.allowed);
        }

        #[tokio::test]
        async fn test_call_site_switch_skips_check() {
            let dir = Arc::new(InMemoryDirectory::new());
            dir.insert(Agent::new("a1", "A", MaturityLevel::Student, "ws-1"));
            let config = GovernanceConfig {
                check_jobs: false,
                ..Default::default()
            };
            let service = GovernanceService::new(dir, &config);

            assert!(!service.is_enabled(CallSite::Jobs));
            let decision = service
                .can_perform_action_at(CallSite::Jobs, "a1", "submit_form")
                .await
                .unwrap();
            assert!(decision.allowed);
            assert!(decision.reason.contains("disabled"));

            // Enabled sites still deny
            let decision = service
                .can_perform_action_at(CallSite::Proposals, "a1", "submit_form")
                .await
                .unwrap();
            assert!(!decision.allowed);
        }

        #[tokio::test]
        async fn test_require_surfaces_permission_denied() {
            let (_, service) = setup(MaturityLevel::Student);
            service.require("a1", "present_chart").await.unwrap();

            let err = service.require("a1", "submit_form").await.unwrap_err();
            match err {
                warden_core::WardenError::PermissionDenied {
                    action,
                    required,
                    actual,
                } => {
                    assert_eq!(action, "submit_form");
                    assert_eq!(required, MaturityLevel::Supervised);
                    assert_eq!(actual, MaturityLevel::Student);
                }
                other => panic!("expected PermissionDenied, got {other:?}"),
            }
        }

        #[test]
        fn test_outcome_recorder_totals() {
            let recorder = OutcomeRecorder::new();
            recorder.record_outcome("a1", true);
            recorder.record_outcome("a1", true);
            recorder.record_outcome("a1", false);
            assert_eq!(recorder.totals("a1"), (2, 1));
            assert_eq!(recorder.totals("never-seen"), (0, 0));
        }
    }
}
