use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use habitsync_core::{user_fingerprint, BatchReport, SyncConflict, SyncService};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot};
use crate::wire::{parse_since, WireChanges};

const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_CONFLICT_LIMIT: usize = 50;
const MAX_CONFLICT_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    sync: SyncService,
    jwt_verifier: Arc<JwtVerifier>,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, sync: SyncService) -> Self {
        Self {
            sync,
            jwt_verifier: Arc::new(JwtVerifier::from_config(&config)),
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(config.as_ref())),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync/pull", get(pull))
        .route("/sync/push", post(push))
        .route("/sync/conflicts", get(list_conflicts))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot().await,
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct PullQuery {
    since: Option<String>,
}

#[derive(Debug, Serialize)]
struct PullResponse {
    server_time: DateTime<Utc>,
    #[serde(flatten)]
    changes: WireChanges,
}

async fn pull(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<PullQuery>,
) -> Result<Json<PullResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::SyncPull, &user.user_id)
        .await?;

    let since = query
        .since
        .as_deref()
        .ok_or_else(|| AppError::bad_request("Missing `since` query parameter"))
        .and_then(parse_since)?;

    let server_time = Utc::now();
    let delta = state.sync.pull(&user.user_id, since).await?;
    tracing::info!(
        endpoint = "sync_pull",
        user = user_fingerprint(&user.user_id),
        session = user.session_id.as_deref().unwrap_or("none"),
        records = delta.len(),
        "Served sync delta"
    );
    Ok(Json(PullResponse {
        server_time,
        changes: delta.into(),
    }))
}

#[derive(Debug, Serialize)]
struct PushResponse {
    message: &'static str,
    report: BatchReport,
}

async fn push(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<WireChanges>, JsonRejection>,
) -> Result<Json<PushResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::SyncPush, &user.user_id)
        .await?;

    let Json(changes) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let records = changes.len();
    if records > state.config.sync_max_batch_records {
        return Err(AppError::bad_request(format!(
            "Batch has {records} records; the limit is {}",
            state.config.sync_max_batch_records
        )));
    }

    let batch = changes.into_core()?;
    let report = state.sync.push(&user.user_id, &batch).await?;
    tracing::info!(
        endpoint = "sync_push",
        user = user_fingerprint(&user.user_id),
        session = user.session_id.as_deref().unwrap_or("none"),
        records,
        "Applied sync push"
    );
    Ok(Json(PushResponse {
        message: "applied",
        report,
    }))
}

#[derive(Debug, Deserialize)]
struct ConflictsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ConflictsResponse {
    conflicts: Vec<SyncConflict>,
}

async fn list_conflicts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ConflictsQuery>,
) -> Result<Json<ConflictsResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::ConflictList, &user.user_id)
        .await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_CONFLICT_LIMIT)
        .clamp(1, MAX_CONFLICT_LIMIT);
    let conflicts = state.sync.list_conflicts(&user.user_id, limit).await?;
    Ok(Json(ConflictsResponse { conflicts }))
}
