//! Web API endpoints: intents, session reports, playback decisions and
//! inspection.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, error};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use xg2g_protocol::error::PROBLEM_CONTENT_TYPE;
use xg2g_protocol::{IntentRequest, Problem, ProblemCode, SessionState, HEADER_CORRELATION_ID, HEADER_IDEMPOTENCY_KEY};

use crate::context::{generate_correlation_id, RequestContext};
use crate::orchestrator::IntentError;
use crate::playback::{decide_for_client, ClientProfile, Headers, MediaInfo, MediaTruth, Policy, ResolveRequest};
use crate::resilience::Outcome;
use crate::web::state::WebState;

// ============================================================================
// Request bodies
// ============================================================================

/// Body of `POST /api/sessions/:id/state`.
#[derive(Debug, Deserialize)]
pub struct StateReport {
    pub state: String,
}

/// Body of `POST /api/playback-info`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackInfoRequest {
    #[serde(alias = "recordingID")]
    pub recording_id: String,
    #[serde(default)]
    pub protocol_hint: String,
}

/// Body of `POST /api/playback/decide`.
#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    #[serde(flatten)]
    pub media: MediaInfo,
    #[serde(flatten)]
    pub policy: Policy,
}

/// Body of `POST /api/breakers/:name/report`.
#[derive(Debug, Deserialize)]
pub struct BreakerReport {
    pub outcome: Outcome,
}

// ============================================================================
// Helpers
// ============================================================================

fn correlation_header_name() -> HeaderName {
    HeaderName::from_static("x-correlation-id")
}

fn correlation_headers(correlation_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        headers.insert(correlation_header_name(), value);
    }
    headers
}

/// Render a problem as `application/problem+json`, with `Retry-After` when
/// the problem carries a retry hint.
pub fn problem_response(problem: Problem) -> Response {
    let status = StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut headers = match &problem.correlation_id {
        Some(id) => correlation_headers(id),
        None => HeaderMap::new(),
    };
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_CONTENT_TYPE));
    if let Some(secs) = problem.retry_after_secs {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    let body = serde_json::to_vec(&problem).unwrap_or_default();
    (status, headers, body).into_response()
}

fn bad_request(correlation_id: &str, detail: impl Into<String>) -> Response {
    problem_response(
        Problem::new(ProblemCode::InvalidInput, 400, "Bad request", detail).with_correlation_id(correlation_id),
    )
}

fn intent_error_response(ctx: &RequestContext, err: IntentError) -> Response {
    problem_response(err.to_problem(&ctx.correlation_id))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Build the request context. A malformed correlation ID is answered
/// with 400 instead of being replaced.
fn request_context(headers: &HeaderMap, body_correlation_id: Option<&str>) -> Result<RequestContext, Response> {
    let header = match headers.get(HEADER_CORRELATION_ID) {
        Some(value) => match value.to_str() {
            Ok(value) => Some(value),
            Err(_) => {
                return Err(bad_request(
                    &generate_correlation_id(),
                    "correlation ID contains non-ASCII characters",
                ))
            }
        },
        None => None,
    };
    RequestContext::from_client(header, body_correlation_id)
        .map_err(|e| bad_request(&generate_correlation_id(), e.to_string()))
}

/// Request headers as the playback resolvers see them.
fn playback_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}

/// Run store-bound work off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, IntentError>
where
    F: FnOnce() -> Result<T, IntentError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => {
            error!("[Web] Worker task failed: {}", e);
            Err(IntentError::Internal(format!("worker task failed: {}", e)))
        }
    }
}

// ============================================================================
// Intents
// ============================================================================

/// `POST /intents`: start or stop a stream.
pub async fn post_intent(State(state): State<Arc<WebState>>, headers: HeaderMap, body: Bytes) -> Response {
    let req: IntentRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            let correlation_id = request_context(&headers, None)
                .map(|ctx| ctx.correlation_id)
                .unwrap_or_else(|_| generate_correlation_id());
            return bad_request(&correlation_id, format!("invalid intent body: {}", e));
        }
    };
    let ctx = match request_context(&headers, req.correlation_id.as_deref()) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let idempotency_key = header_str(&headers, HEADER_IDEMPOTENCY_KEY).map(str::to_string);

    // Dropping this future (client gone) drops the guard and cancels the context.
    let guard = ctx.cancel.clone().drop_guard();
    let orchestrator = state.orchestrator.clone();
    let task_ctx = ctx.clone();
    let result = run_blocking(move || orchestrator.submit(&task_ctx, idempotency_key.as_deref(), &req)).await;
    guard.disarm();

    match result {
        Ok(accepted) => {
            debug!(
                "[Web] {} intent accepted session={} replayed={}",
                ctx.correlation_id, accepted.response.session_id, accepted.replayed
            );
            (
                StatusCode::ACCEPTED,
                correlation_headers(&ctx.correlation_id),
                Json(accepted.response),
            )
                .into_response()
        }
        Err(e) => intent_error_response(&ctx, e),
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// `GET /api/sessions`
pub async fn get_sessions(State(state): State<Arc<WebState>>, headers: HeaderMap) -> Response {
    let ctx = match request_context(&headers, None) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let orchestrator = state.orchestrator.clone();
    let task_ctx = ctx.clone();
    match run_blocking(move || orchestrator.list_sessions(&task_ctx)).await {
        Ok(sessions) => Json(json!({ "sessions": sessions })).into_response(),
        Err(e) => intent_error_response(&ctx, e),
    }
}

/// `GET /api/sessions/:id`
pub async fn get_session(
    State(state): State<Arc<WebState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match request_context(&headers, None) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let orchestrator = state.orchestrator.clone();
    let task_ctx = ctx.clone();
    match run_blocking(move || orchestrator.get_session(&task_ctx, &id)).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => intent_error_response(&ctx, e),
    }
}

/// `POST /api/sessions/:id/state`: lifecycle report from the executor.
pub async fn post_session_state(
    State(state): State<Arc<WebState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = match request_context(&headers, None) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let report: StateReport = match serde_json::from_slice(&body) {
        Ok(report) => report,
        Err(e) => return bad_request(&ctx.correlation_id, format!("invalid state report: {}", e)),
    };
    let next = match SessionState::parse(report.state.trim()) {
        Ok(next) => next,
        Err(e) => return bad_request(&ctx.correlation_id, e.to_string()),
    };

    let orchestrator = state.orchestrator.clone();
    let task_ctx = ctx.clone();
    match run_blocking(move || orchestrator.report_state(&task_ctx, &id, next)).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => intent_error_response(&ctx, e),
    }
}

/// `POST /api/sessions/:id/heartbeat`: extend the session's leases.
pub async fn post_heartbeat(
    State(state): State<Arc<WebState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match request_context(&headers, None) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let orchestrator = state.orchestrator.clone();
    let task_ctx = ctx.clone();
    match run_blocking(move || orchestrator.heartbeat(&task_ctx, &id)).await {
        Ok(record) => Json(json!({
            "sessionID": record.session_id,
            "state": record.state,
        }))
        .into_response(),
        Err(e) => intent_error_response(&ctx, e),
    }
}

// ============================================================================
// Playback
// ============================================================================

/// `POST /api/playback-info`: truth-based playback decision.
pub async fn post_playback_info(State(state): State<Arc<WebState>>, headers: HeaderMap, body: Bytes) -> Response {
    let ctx = match request_context(&headers, None) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let info: PlaybackInfoRequest = match serde_json::from_slice(&body) {
        Ok(info) => info,
        Err(e) => return bad_request(&ctx.correlation_id, format!("invalid playback request: {}", e)),
    };
    if info.recording_id.trim().is_empty() {
        return bad_request(&ctx.correlation_id, "recordingId is required");
    }

    let req = ResolveRequest {
        recording_id: info.recording_id.trim().to_string(),
        protocol_hint: info.protocol_hint,
        headers: playback_headers(&headers),
    };
    match state.playback.resolve(&ctx, &req).await {
        Ok(decision) => {
            debug!(
                "[Web] {} playback {} -> {}",
                ctx.correlation_id,
                req.recording_id,
                decision.reason.as_str()
            );
            (correlation_headers(&ctx.correlation_id), Json(decision)).into_response()
        }
        Err(e) => problem_response(e.to_problem().with_correlation_id(&ctx.correlation_id)),
    }
}

/// `POST /api/playback/decide`: user-agent table decision for a probed file.
pub async fn post_playback_decide(headers: HeaderMap, body: Bytes) -> Response {
    let ctx = match request_context(&headers, None) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let req: DecideRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => return bad_request(&ctx.correlation_id, format!("invalid decide request: {}", e)),
    };
    let user_agent = header_str(&headers, header::USER_AGENT.as_str()).unwrap_or_default();
    let decision = decide_for_client(&ClientProfile::from_user_agent(user_agent), &req.media, req.policy);
    Json(decision).into_response()
}

/// `POST /api/media/:id`: record scanner facts for a recording.
pub async fn post_media(State(state): State<Arc<WebState>>, Path(id): Path<String>, body: Bytes) -> Response {
    let truth: MediaTruth = match serde_json::from_slice(&body) {
        Ok(truth) => truth,
        Err(e) => return bad_request(&generate_correlation_id(), format!("invalid media facts: {}", e)),
    };
    state.catalog.upsert(id.trim(), truth);
    StatusCode::NO_CONTENT.into_response()
}

// ============================================================================
// Breakers and statistics
// ============================================================================

/// `GET /api/breakers`
pub async fn get_breakers(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    Json(json!({ "breakers": state.breakers.snapshot() }))
}

/// `POST /api/breakers/:name/report`: outcome of a guarded operation.
pub async fn post_breaker_report(
    State(state): State<Arc<WebState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let report: BreakerReport = match serde_json::from_slice(&body) {
        Ok(report) => report,
        Err(e) => return bad_request(&generate_correlation_id(), format!("invalid outcome report: {}", e)),
    };
    let breaker = state.breakers.get_or_create(name.trim());
    breaker.record(report.outcome);
    Json(breaker.snapshot()).into_response()
}

/// `GET /api/metrics`
pub async fn get_metrics(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// `GET /api/stats`
pub async fn get_stats(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    Json(state.stats())
}
