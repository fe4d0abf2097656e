//! HTTP API integration tests — exercise the job endpoints against an
//! in-memory broker and an isolated ledger.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use warden_config::schema::{GovernanceConfig, ServerConfig};
use warden_core::{Agent, MaturityLevel};
use warden_governance::GovernanceService;
use warden_ledger::LedgerStore;
use warden_queue::{InMemoryBroker, QueueManager, UnreachableBroker};
use warden_registry::{ContextResolver, InMemoryDirectory};

fn setup() -> axum::Router {
    setup_with_broker(Arc::new(InMemoryBroker::with_defaults()))
}

fn setup_with_broker(broker: Arc<dyn warden_queue::Broker>) -> axum::Router {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.insert(Agent::new("a1", "Agent One", MaturityLevel::Intern, "ws-1"));
    let governance = Arc::new(GovernanceService::new(
        directory.clone(),
        &GovernanceConfig::default(),
    ));
    let resolver = Arc::new(ContextResolver::new(directory));
    let ledger = Arc::new(LedgerStore::open_in_memory().unwrap());
    let manager = Arc::new(QueueManager::new(broker, ledger.clone()));

    warden_server::build_router(
        &ServerConfig::default(),
        manager,
        governance,
        resolver,
        ledger,
    )
}

/// Read the full body of a response as a string.
async fn body_string(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    serde_json::from_str(&body_string(resp).await).unwrap()
}

fn enqueue_request(user_id: &str) -> Request<Body> {
    Request::post("/api/v1/jobs")
        .header("content-type", "application/json")
        .body(Body::from(format!(
            r#"{{"kind":"agent_notification","payload":{{"msg":"hi"}},"user_id":"{user_id}"}}"#
        )))
        .unwrap()
}

// ── Health & metrics ───────────────────────────────────────────

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup();
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(ct.contains("text/plain"));
    let body = body_string(resp).await;
    assert!(body.contains("warden_http_requests_total"));
    assert!(body.contains("warden_governance_cache_hits_total"));
    assert!(body.contains("warden_queue_depth"));
}

// ── Inline action mediation ────────────────────────────────────

fn authorize_request(action_type: &str) -> Request<Body> {
    Request::post("/api/v1/actions")
        .header("content-type", "application/json")
        .body(Body::from(format!(
            r#"{{"user_id":"u1","workspace_id":"ws-1","action_type":"{action_type}"}}"#
        )))
        .unwrap()
}

#[tokio::test]
async fn test_authorize_allowed_action_opens_ledger_row() {
    let app = setup();
    let resp = app
        .clone()
        .oneshot(authorize_request("stream_chat"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["allowed"], true);
    assert_eq!(json["agent_id"], "a1");
    assert_eq!(json["resolution_path"], "workspace_default");
    let execution_id = json["execution_id"].as_str().unwrap().to_string();

    // Complete the action; the row is finalized exactly once
    let resp = app
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/actions/{execution_id}/complete"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"success":true,"output":"streamed"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "completed");

    // A second completion conflicts instead of overwriting
    let resp = app
        .oneshot(
            Request::post(format!("/api/v1/actions/{execution_id}/complete"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"success":false,"error":"late"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_authorize_denied_action_has_no_execution() {
    let app = setup();
    // Intern agent, submit_form requires SUPERVISED
    let resp = app.oneshot(authorize_request("submit_form")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["allowed"], false);
    assert!(json["execution_id"].is_null());
    assert!(
        json["decision"]["reason"]
            .as_str()
            .unwrap()
            .contains("required: SUPERVISED, actual: INTERN")
    );
}

#[tokio::test]
async fn test_authorize_unresolvable_workspace_conflicts() {
    let app = setup();
    let resp = app
        .oneshot(
            Request::post("/api/v1/actions")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"user_id":"u1","workspace_id":"ws-empty","action_type":"stream_chat"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "resolution_failed");
}

// ── Job management ─────────────────────────────────────────────

#[tokio::test]
async fn test_enqueue_and_get_status() {
    let app = setup();
    let resp = app.clone().oneshot(enqueue_request("u1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let job_id = json["job_id"].as_str().unwrap().to_string();
    assert_eq!(json["status"], "queued");

    let resp = app
        .oneshot(
            Request::get(format!("/api/v1/jobs/{job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "queued");
}

#[tokio::test]
async fn test_enqueue_scheduled_job() {
    let app = setup();
    let when = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
    let resp = app
        .clone()
        .oneshot(
            Request::post("/api/v1/jobs")
                .header("content-type", "application/json")
                .body(Body::from(format!(
                    r#"{{"kind":"agent_notification","user_id":"u1","scheduled_for":"{when}"}}"#
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::get("/api/v1/jobs?user_id=u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    let jobs = json.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["status"], "queued");
    assert!(jobs[0]["scheduled_for"].is_string());
}

#[tokio::test]
async fn test_unknown_job_kind_is_rejected() {
    let app = setup();
    let resp = app
        .oneshot(
            Request::post("/api/v1/jobs")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"kind":"mine_bitcoin","user_id":"u1"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(resp).await;
    assert!(json["message"].as_str().unwrap().contains("unknown job kind"));
}

#[tokio::test]
async fn test_job_status_not_found() {
    let app = setup();
    let resp = app
        .oneshot(
            Request::get("/api/v1/jobs/job_missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "job_not_found");
    assert_eq!(json["retryable"], false);
}

#[tokio::test]
async fn test_cancel_job() {
    let app = setup();
    let resp = app.clone().oneshot(enqueue_request("u1")).await.unwrap();
    let job_id = body_json(resp).await["job_id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/jobs/{job_id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["cancelled"], true);

    // Second cancel is refused — the job is already terminal
    let resp = app
        .oneshot(
            Request::post(format!("/api/v1/jobs/{job_id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["cancelled"], false);
}

#[tokio::test]
async fn test_queue_stats() {
    let app = setup();
    app.clone().oneshot(enqueue_request("u1")).await.unwrap();

    let resp = app
        .oneshot(
            Request::get("/api/v1/queue/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["queue"]["depth"], 1);
    assert_eq!(json["queue"]["enqueued_total"], 1);
    assert!(json["governance_cache"]["hits"].is_number());
}

// ── Degraded mode ──────────────────────────────────────────────

#[tokio::test]
async fn test_unreachable_broker_returns_503() {
    let app = setup_with_broker(Arc::new(UnreachableBroker));
    let resp = app.clone().oneshot(enqueue_request("u1")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "queue_unavailable");
    assert_eq!(json["retryable"], true);
    // Sanitized: no stack traces or internals in the message
    assert!(json["message"].as_str().unwrap().contains("queue unavailable"));

    // Health still answers while the broker is down
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
