use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;

use seatlock_core::client::QueueClient;
use seatlock_core::infrastructure_in_memory::InMemoryCatalog;
use seatlock_core::presence::Viewer;
use seatlock_core::types::{
    AccessMode, ClaimOutcome, HeartbeatOutcome, LeaveOutcome, Participant, QueueSnapshot, ReleaseOutcome,
    SweepOutcome,
};
use seatlock_core::{QueueConfig, QueueError, QueueResult};

use crate::handlers::*;

pub type AppState = Arc<QueueClient>;

pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    pub storage: String,
    pub config: QueueConfig,
    /// Restrict the server to these resource ids; empty accepts any id
    pub resources: Vec<String>,
    /// 0 disables the background sweeper
    pub sweep_interval_ms: u64,
    pub max_in_flight: usize,
}

pub async fn run(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        lease_timeout_ms = options.config.lease_timeout_ms,
        heartbeat_interval_ms = options.config.heartbeat_interval_ms,
        missed_beats = options.config.tolerated_missed_beats(),
        "Editors are evicted after missing this many heartbeats"
    );
    let client = create_client(&options.storage, options.config, &options.resources)?;
    let state: AppState = Arc::new(client);

    if options.sweep_interval_ms > 0 {
        spawn_sweeper(Arc::clone(&state), options.sweep_interval_ms);
    }

    let app = Router::new()
        // Health is always open (no auth)
        .route("/health", get(health))
        // Protected routes
        .route("/resources/{id}/join", post(join))
        .route("/resources/{id}/claim", post(claim))
        .route("/resources/{id}/heartbeat", post(heartbeat))
        .route("/resources/{id}/leave", post(leave))
        .route("/resources/{id}/release", post(release))
        .route("/resources/{id}/status", get(status))
        .route("/resources/{id}/access", get(access))
        .route("/resources/{id}/sweep", post(sweep))
        .route("/sweep", post(sweep_all))
        .route("/resources/{id}/viewers", get(list_viewers).post(touch_viewer))
        .route("/resources/{id}/viewers/{session}", delete(exit_viewer))
        .route("/resources/{id}/online", get(online_users))
        .layer(middleware::from_fn(auth_middleware))
        .layer(GlobalConcurrencyLimitLayer::new(options.max_in_flight.max(1)))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", options.host, options.port);

    if std::env::var("SEATLOCK_API_KEY").is_ok() {
        tracing::info!("🔐 API key authentication enabled");
    } else {
        tracing::warn!("⚠️  No SEATLOCK_API_KEY set, server is open (dev mode)");
    }

    tracing::info!("🪑 Seatlock server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn spawn_sweeper(state: AppState, interval_ms: u64) {
    tracing::info!(interval_ms, "🧹 Background sweeper enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            match blocking(&state, |client| client.sweep_all()).await {
                Ok(outcomes) => {
                    let evicted: usize = outcomes.iter().map(|o| o.evicted).sum();
                    if evicted > 0 {
                        tracing::info!(evicted, resources = outcomes.len(), "Swept stale holders");
                    }
                }
                Err(e) => tracing::warn!(error = %e.body.error, "Sweep failed"),
            }
        }
    });
}

/// Runs a store-touching call off the async runtime.
async fn blocking<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&QueueClient) -> QueueResult<T> + Send + 'static,
{
    let client = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(&client))
        .await
        .map_err(|e| ApiError::internal(format!("worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // If no API key is configured, allow all requests (dev mode)
    let expected_key = match std::env::var("SEATLOCK_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => return Ok(next.run(request).await),
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if token == expected_key {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("🚫 Unauthorized request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Result<Json<ApiResponse<HealthResponse>>, ApiError> {
    let active_resources = blocking(&state, |client| {
        client.coordinator().store().resource_ids().map(|ids| ids.len())
    })
    .await?;
    Ok(Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        active_resources,
        watched_resources: state.watched_resources(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })))
}

fn participant_from(req: &ParticipantRequest) -> Result<Participant, ApiError> {
    req.validate().map_err(ApiError::bad_request)?;
    Ok(req.participant())
}

async fn join(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ParticipantRequest>,
) -> Result<Json<ApiResponse<QueueSnapshot>>, ApiError> {
    let participant = participant_from(&req)?;
    let snapshot = blocking(&state, move |client| client.join(&id, &participant)).await?;
    Ok(Json(ApiResponse::ok(snapshot)))
}

async fn claim(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ParticipantRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ClaimOutcome>>), ApiError> {
    let participant = participant_from(&req)?;
    let outcome = blocking(&state, move |client| client.claim(&id, &participant)).await?;
    let status = if outcome.already_owned {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ApiResponse::ok(outcome))))
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ParticipantRequest>,
) -> Result<Json<ApiResponse<HeartbeatOutcome>>, ApiError> {
    validate_user_id(&req.user_id).map_err(ApiError::bad_request)?;
    let outcome = blocking(&state, move |client| client.heartbeat(&id, &req.user_id)).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

async fn leave(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ParticipantRequest>,
) -> Result<Json<ApiResponse<LeaveOutcome>>, ApiError> {
    validate_user_id(&req.user_id).map_err(ApiError::bad_request)?;
    let outcome = blocking(&state, move |client| client.leave(&id, &req.user_id)).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

async fn release(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ParticipantRequest>,
) -> Result<Json<ApiResponse<ReleaseOutcome>>, ApiError> {
    validate_user_id(&req.user_id).map_err(ApiError::bad_request)?;
    let outcome = blocking(&state, move |client| client.release(&id, &req.user_id)).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApiResponse<QueueSnapshot>>, ApiError> {
    validate_user_id(&query.user_id).map_err(ApiError::bad_request)?;
    let snapshot = blocking(&state, move |client| client.status(&id, &query.user_id)).await?;
    Ok(Json(ApiResponse::ok(snapshot)))
}

async fn access(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApiResponse<AccessMode>>, ApiError> {
    validate_user_id(&query.user_id).map_err(ApiError::bad_request)?;
    let access = blocking(&state, move |client| client.access(&id, &query.user_id)).await?;
    Ok(Json(ApiResponse::ok(access)))
}

async fn sweep(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SweepOutcome>>, ApiError> {
    let outcome = blocking(&state, move |client| client.sweep(&id)).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

async fn sweep_all(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<SweepOutcome>>>, ApiError> {
    let outcomes = blocking(&state, |client| client.sweep_all()).await?;
    Ok(Json(ApiResponse::ok(outcomes)))
}

async fn list_viewers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<Vec<Viewer>>> {
    Json(ApiResponse::ok(state.viewers(&id)))
}

async fn touch_viewer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ViewerRequest>,
) -> Result<Json<ApiResponse<ViewerSessionResponse>>, ApiError> {
    validate_user_id(&req.user_id).map_err(ApiError::bad_request)?;
    let session_id = match req.session_id {
        Some(session_id) => {
            if !state.touch_viewer(&id, &session_id) {
                return Err(ApiError::not_found(format!(
                    "Viewer session '{}' not found or expired",
                    session_id
                )));
            }
            session_id
        }
        None => {
            let mut participant = Participant::new(req.user_id);
            participant.user_name = req.user_name;
            state.enter_viewer(&id, &participant)
        }
    };
    Ok(Json(ApiResponse::ok(ViewerSessionResponse { session_id })))
}

async fn exit_viewer(
    State(state): State<AppState>,
    Path((id, session)): Path<(String, String)>,
) -> Json<ApiResponse<ViewerExitResponse>> {
    let removed = state.exit_viewer(&id, &session);
    Json(ApiResponse::ok(ViewerExitResponse { removed }))
}

async fn online_users(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<Vec<String>>> {
    Json(ApiResponse::ok(state.online_users(&id)))
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

pub fn create_client(storage: &str, config: QueueConfig, resources: &[String]) -> QueueResult<QueueClient> {
    let client = if storage == "memory" {
        tracing::info!("💾 Storage backend: in-memory (queues will not persist)");
        QueueClient::in_memory(config)?
    } else if let Some(path) = storage.strip_prefix("sqlite:") {
        open_sqlite(path, config)?
    } else {
        return Err(QueueError::InvalidRequest(format!(
            "Unknown storage backend: '{}'. Use 'memory' or 'sqlite:<path>'",
            storage
        )));
    };

    if resources.is_empty() {
        return Ok(client);
    }
    tracing::info!(count = resources.len(), "Resource allowlist enabled");
    let catalog = InMemoryCatalog::with_resources(resources.iter().cloned());
    Ok(client.with_catalog(Arc::new(catalog)))
}

#[cfg(feature = "sqlite")]
fn open_sqlite(path: &str, config: QueueConfig) -> QueueResult<QueueClient> {
    tracing::info!("💾 Storage backend: SQLite ({})", path);
    QueueClient::with_sqlite(path, config)
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_path: &str, _config: QueueConfig) -> QueueResult<QueueClient> {
    Err(QueueError::InvalidRequest(
        "SQLite storage requested but `sqlite` feature is not enabled. \
         Rebuild with: cargo build --features sqlite"
            .to_string(),
    ))
}
