//! Route definitions for the Scoreledger server
//!
//! - POST /predict - Score an observation and record it
//! - POST /update - Attach a ground-truth label to a recorded observation
//! - GET /predictions/:observation_id - Fetch a stored record
//! - GET /health - Health check endpoint
//!
//! Request bodies reach the scoring service as text so the ledger stores
//! them exactly as sent. The service is synchronous (SQLite under a mutex),
//! so every handler hands its work to the blocking pool.

use axum::{
    body::Body,
    extract::{rejection::StringRejection, DefaultBodyLimit, Path, State},
    http::Request,
    routing::{get, post},
    Json, Router,
};
use scoreledger_core::{PredictionRecord, ScoringService, ServiceError};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use super::{ApiError, HealthResponse, HealthStatus, ScoreResponse};
use crate::config::ServerConfig;

/// State shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScoringService>,
    /// Start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: Arc<ScoringService>) -> Self {
        Self {
            service,
            start_time: Instant::now(),
        }
    }
}

/// Build the router with tracing and body-size limits applied
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/update", post(update))
        .route("/predictions/:observation_id", get(get_prediction))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %uuid::Uuid::new_v4(),
                )
            }),
        )
        .with_state(state)
}

/// Run a service call on the blocking pool
async fn run_blocking<T, F>(service: Arc<ScoringService>, call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ScoringService) -> Result<T, ServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|err| ApiError::InternalError(format!("Worker task failed: {}", err)))?
        .map_err(ApiError::from)
}

fn text_body(payload: Result<String, StringRejection>) -> Result<String, ApiError> {
    payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// POST /predict - Score an observation
///
/// A repeated `observation_id` still gets a fresh score; the response then
/// carries an `error` note and the ledger keeps the first record.
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<String, StringRejection>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let body = text_body(payload)?;
    let outcome = run_blocking(state.service, move |service| service.predict(&body)).await?;

    Ok(Json(ScoreResponse {
        prediction: outcome.prediction,
        probability: outcome.probability,
        error: outcome.duplicate_note(),
    }))
}

/// POST /update - Apply a ground-truth label
pub async fn update(
    State(state): State<AppState>,
    payload: Result<String, StringRejection>,
) -> Result<Json<PredictionRecord>, ApiError> {
    let body = text_body(payload)?;
    let record = run_blocking(state.service, move |service| service.update(&body)).await?;
    Ok(Json(record))
}

/// GET /predictions/:observation_id - Fetch a stored record
pub async fn get_prediction(
    State(state): State<AppState>,
    Path(observation_id): Path<i64>,
) -> Result<Json<PredictionRecord>, ApiError> {
    let record =
        run_blocking(state.service, move |service| service.lookup(observation_id)).await?;
    Ok(Json(record))
}

/// GET /health - Health check endpoint
///
/// Reports `degraded` when the ledger cannot be queried.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let service = Arc::clone(&state.service);
    let ledger_records = run_blocking(service, |service| Ok(service.ledger().count()?))
        .await
        .map_err(|err| tracing::warn!(error = ?err, "Ledger health probe failed"))
        .ok();

    let status = if ledger_records.is_some() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        model: state.service.predictor().name().to_string(),
        schema_columns: state.service.schema().len(),
        ledger_records,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
