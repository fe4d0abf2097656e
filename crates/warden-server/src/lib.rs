//! # warden-server
//!
//! HTTP API for the Warden core:
//!
//! - inline action mediation (authorize + complete, audited in the ledger)
//! - job management (enqueue, list, status, cancel)
//! - queue health/stats
//! - overall health check and Prometheus metrics
//!
//! Every error body is sanitized — kind + public message, no internals —
//! and a broker outage surfaces as 503 with `retryable: true`, never a 500.

pub mod metrics;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

use warden_config::schema::ServerConfig;
use warden_core::WardenError;
use warden_governance::{CallSite, GovernanceDecision, GovernanceService};
use warden_ledger::{ExecutionStatus, LedgerStore};
use warden_queue::{JobKind, QueueManager};
use warden_registry::ContextResolver;

/// Shared server state. Everything is an explicit constructed instance —
/// tests build their own isolated state.
pub struct AppState {
    pub manager: Arc<QueueManager>,
    pub governance: Arc<GovernanceService>,
    pub resolver: Arc<ContextResolver>,
    pub ledger: Arc<LedgerStore>,
    pub metrics: metrics::Metrics,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

/// Inline action authorization request.
#[derive(Deserialize)]
struct AuthorizeActionRequest {
    user_id: String,
    workspace_id: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    requested_agent_id: Option<String>,
    action_type: String,
}

/// Authorization outcome. `execution_id` is present only when the action
/// was allowed and a ledger row was opened for it.
#[derive(Serialize)]
struct AuthorizeActionResponse {
    allowed: bool,
    agent_id: String,
    resolution_path: String,
    decision: GovernanceDecision,
    execution_id: Option<String>,
}

/// Finalization of an inline action previously authorized.
#[derive(Deserialize)]
struct CompleteActionRequest {
    success: bool,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Enqueue request body.
#[derive(Deserialize)]
struct EnqueueRequest {
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
    user_id: String,
    /// RFC 3339 timestamp; omitted = run now.
    #[serde(default)]
    scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct EnqueueResponse {
    job_id: String,
    status: String,
}

#[derive(Deserialize)]
struct ListJobsParams {
    user_id: String,
}

#[derive(Serialize)]
struct JobSummary {
    job_id: String,
    kind: String,
    status: String,
    scheduled_for: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// Sanitized error body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    retryable: bool,
}

struct ApiError(WardenError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WardenError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            WardenError::JobNotFound(_) | WardenError::ProposalNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            WardenError::InvalidSchedule(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WardenError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            WardenError::ResolutionFailed(_) | WardenError::LedgerInconsistency(_) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.public_message(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the Axum router around explicit component instances.
pub fn build_router(
    config: &ServerConfig,
    manager: Arc<QueueManager>,
    governance: Arc<GovernanceService>,
    resolver: Arc<ContextResolver>,
    ledger: Arc<LedgerStore>,
) -> Router {
    let state = Arc::new(AppState {
        manager,
        governance,
        resolver,
        ledger,
        metrics: metrics::Metrics::new(),
    });

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/actions", post(authorize_action_handler))
        .route(
            "/api/v1/actions/{execution_id}/complete",
            post(complete_action_handler),
        )
        .route("/api/v1/jobs", post(enqueue_handler).get(list_jobs_handler))
        .route("/api/v1/jobs/{id}", get(job_status_handler))
        .route("/api/v1/jobs/{id}/cancel", post(cancel_job_handler))
        .route("/api/v1/queue/stats", get(queue_stats_handler))
        .with_state(state);

    if config.cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.metrics.inc_http_requests();
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: state.metrics.uptime_secs(),
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.inc_http_requests();
    let cache = state.governance.cache_stats();
    // Depth is best-effort; an unreachable broker just drops the gauge.
    let depth = state.manager.stats().await.ok().map(|s| s.depth);
    let body = state
        .metrics
        .render_prometheus(cache.hits, cache.misses, depth);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

/// Mediate an inline action: resolve the agent, run the governance check,
/// and open a ledger row before the caller performs any side effect.
async fn authorize_action_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthorizeActionRequest>,
) -> Result<Json<AuthorizeActionResponse>, ApiError> {
    state.metrics.inc_http_requests();

    let (agent, ctx) = state
        .resolver
        .resolve(
            &req.user_id,
            &req.workspace_id,
            req.session_id.as_deref(),
            req.requested_agent_id.as_deref(),
            &req.action_type,
        )
        .await
        .map_err(|e| state.track(e))?;

    let decision = state
        .governance
        .can_perform_action_at(CallSite::Chat, &agent.id, &req.action_type)
        .await
        .map_err(|e| state.track(e))?;

    // Denied attempts never open a ledger row: nothing is dispatched.
    let execution_id = if decision.allowed {
        Some(
            state
                .ledger
                .begin_execution(&agent.id, &agent.workspace_id, &ctx.input_summary(), "request")
                .map_err(|e| state.track(e))?,
        )
    } else {
        None
    };

    Ok(Json(AuthorizeActionResponse {
        allowed: decision.allowed,
        agent_id: agent.id,
        resolution_path: ctx.resolution_path.as_str().to_string(),
        decision,
        execution_id,
    }))
}

/// Finalize an inline action's ledger row and feed the outcome to the
/// maturity-promotion process.
async fn complete_action_handler(
    State(state): State<Arc<AppState>>,
    Path(execution_id): Path<String>,
    Json(req): Json<CompleteActionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.inc_http_requests();

    let status = if req.success {
        ExecutionStatus::Completed
    } else {
        ExecutionStatus::Failed
    };
    state
        .ledger
        .finish_execution(
            &execution_id,
            status,
            req.output.as_deref(),
            req.error.as_deref(),
        )
        .map_err(|e| state.track(e))?;

    if let Ok(Some(row)) = state.ledger.get_execution(&execution_id) {
        state.governance.record_outcome(&row.agent_id, req.success);
    }

    Ok(Json(serde_json::json!({
        "execution_id": execution_id,
        "status": status.as_str(),
    })))
}

async fn enqueue_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    state.metrics.inc_http_requests();

    let Some(kind) = JobKind::parse(&req.kind) else {
        state.metrics.inc_http_errors();
        return Err(ApiError(WardenError::InvalidSchedule(format!(
            "unknown job kind: {}",
            req.kind
        ))));
    };

    let result = match req.scheduled_for {
        Some(when) => {
            state
                .manager
                .enqueue_scheduled(kind, req.payload, &req.user_id, when)
                .await
        }
        None => state.manager.enqueue_now(kind, req.payload, &req.user_id).await,
    };

    let job_id = result.map_err(|e| state.track(e))?;
    state.metrics.inc_jobs_enqueued();
    Ok(Json(EnqueueResponse {
        job_id,
        status: "queued".into(),
    }))
}

async fn list_jobs_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<Vec<JobSummary>>, ApiError> {
    state.metrics.inc_http_requests();
    let jobs = state
        .manager
        .list_jobs(&params.user_id)
        .await
        .map_err(|e| state.track(e))?;
    Ok(Json(
        jobs.into_iter()
            .map(|(job, status)| JobSummary {
                job_id: job.id,
                kind: job.kind.as_str().into(),
                status: status.as_str().into(),
                scheduled_for: job.scheduled_for,
                created_at: job.created_at,
            })
            .collect(),
    ))
}

async fn job_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.inc_http_requests();
    let status = state
        .manager
        .get_job_status(&id)
        .await
        .map_err(|e| state.track(e))?;
    Ok(Json(serde_json::json!({
        "job_id": id,
        "status": status.as_str(),
    })))
}

async fn cancel_job_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.inc_http_requests();
    let cancelled = state
        .manager
        .cancel_job(&id)
        .await
        .map_err(|e| state.track(e))?;
    if cancelled {
        state.metrics.inc_jobs_cancelled();
    }
    Ok(Json(serde_json::json!({
        "job_id": id,
        "cancelled": cancelled,
    })))
}

async fn queue_stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.inc_http_requests();
    let stats = state.manager.stats().await.map_err(|e| state.track(e))?;
    let cache = state.governance.cache_stats();
    Ok(Json(serde_json::json!({
        "queue": stats,
        "governance_cache": cache,
    })))
}

impl AppState {
    /// Count the error in the metrics before handing it to the response
    /// mapper.
    fn track(&self, err: WardenError) -> ApiError {
        self.metrics.inc_http_errors();
        if matches!(err, WardenError::QueueUnavailable(_)) {
            self.metrics.inc_queue_unavailable();
            warn!(error = %err, "queue unavailable — returning 503");
        }
        ApiError(err)
    }
}
