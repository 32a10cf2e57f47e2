//! HTTP API for on-demand weather queries and poller control.
//!
//! Provides endpoints for:
//! - Observations, forecasts and warnings at a position
//! - Pushing the vessel position
//! - Scheduler status, start/stop and the last published deltas
//! - Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use geo_cache::{CacheStatsSnapshot, GeoCache};
use weather_common::{
    ForecastKind, Position, PositionSource, QueryOptions, WeatherError, WeatherRecord,
    WeatherWarning,
};

use crate::host::{DeltaBatch, LatestDeltas, SharedPosition};
use crate::provider::WeatherProvider;
use crate::scheduler::{Poller, SchedulerStatus};

// ============================================================================
// Shared State
// ============================================================================

pub struct AppState {
    pub provider: WeatherProvider,
    pub poller: Arc<Poller>,
    pub position: Arc<SharedPosition>,
    pub deltas: Arc<LatestDeltas>,
    pub cache: Arc<GeoCache>,
    pub metrics: Option<PrometheusHandle>,
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PositionQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub running: bool,
    pub poller: SchedulerStatus,
    pub position: Option<Position>,
    pub cache: CacheStatusResponse,
}

#[derive(Debug, Serialize)]
pub struct CacheStatusResponse {
    pub entries: usize,
    pub precision: usize,
    pub max_age_secs: i64,
    pub stats: CacheStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct PollerResponse {
    pub running: bool,
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub position: Position,
    pub records: Vec<WeatherRecord>,
}

#[derive(Debug, Serialize)]
pub struct WarningsResponse {
    pub position: Position,
    pub warnings: Vec<WeatherWarning>,
}

/// Handler failures. Remote errors are reported generically.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(&'static str),
    Weather(WeatherError),
}

impl From<WeatherError> for ApiError {
    fn from(err: WeatherError) -> Self {
        ApiError::Weather(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::Weather(err) => {
                warn!(error = %err, "Weather request failed");
                let status = StatusCode::from_u16(err.http_status_code())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                let message = match err {
                    WeatherError::FetchFailure(_) => "weather data unavailable".to_string(),
                    other => other.to_string(),
                };
                (status, message)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/observations", get(observations_handler))
        .route("/forecasts/:kind", get(forecasts_handler))
        .route("/warnings", get(warnings_handler))
        .route("/position", put(position_handler))
        .route("/deltas/latest", get(latest_deltas_handler))
        .route("/poller/start", post(start_handler))
        .route("/poller/stop", post(stop_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve the API until `shutdown` resolves.
pub async fn run_server(
    state: Arc<AppState>,
    addr: std::net::SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(%addr, "Starting weather API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /status - Scheduler and cache state
async fn status_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let cache = CacheStatusResponse {
        entries: state.cache.len().await,
        precision: state.cache.precision(),
        max_age_secs: state.cache.max_age().num_seconds(),
        stats: state.cache.stats().snapshot(),
    };

    Json(StatusResponse {
        service: "weather-poller",
        running: state.poller.is_running().await,
        poller: state.poller.status(),
        position: state.position.current_position(),
        cache,
    })
}

/// GET /observations?lat&lon&count
async fn observations_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<PositionQuery>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let position = resolve_position(&params, &state)?;
    let records = state
        .provider
        .get_observations(position, query_options(&params))
        .await?;
    Ok(Json(RecordsResponse { position, records }))
}

/// GET /forecasts/{daily|point}?lat&lon&count
async fn forecasts_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<PositionQuery>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let kind: ForecastKind = kind
        .parse()
        .map_err(|e: WeatherError| ApiError::BadRequest(e.to_string()))?;
    let position = resolve_position(&params, &state)?;
    let records = state
        .provider
        .get_forecasts(position, kind, query_options(&params))
        .await?;
    Ok(Json(RecordsResponse { position, records }))
}

/// GET /warnings?lat&lon
async fn warnings_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<PositionQuery>,
) -> Result<Json<WarningsResponse>, ApiError> {
    let position = resolve_position(&params, &state)?;
    let warnings = state.provider.get_warnings(position).await?;
    Ok(Json(WarningsResponse { position, warnings }))
}

/// PUT /position - Host pushes the vessel position
async fn position_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(position): Json<Position>,
) -> Result<StatusCode, ApiError> {
    if !position.is_valid() {
        return Err(ApiError::BadRequest(format!(
            "position {} is out of range",
            position
        )));
    }
    state.position.set(position);
    state.poller.wake().await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /deltas/latest
async fn latest_deltas_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<DeltaBatch>, ApiError> {
    state
        .deltas
        .latest()
        .map(Json)
        .ok_or(ApiError::NotFound("delta batch"))
}

/// POST /poller/start
async fn start_handler(Extension(state): Extension<Arc<AppState>>) -> Json<PollerResponse> {
    let changed = state.poller.start().await;
    Json(PollerResponse {
        running: state.poller.is_running().await,
        changed,
    })
}

/// POST /poller/stop
async fn stop_handler(Extension(state): Extension<Arc<AppState>>) -> Json<PollerResponse> {
    let changed = state.poller.stop().await;
    Json(PollerResponse {
        running: state.poller.is_running().await,
        changed,
    })
}

/// GET /metrics - Prometheus metrics
async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => ApiError::NotFound("metrics recorder").into_response(),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Explicit `lat`/`lon`, or the vessel position when both are omitted.
fn resolve_position(params: &PositionQuery, state: &AppState) -> Result<Position, ApiError> {
    let position = match (params.lat, params.lon) {
        (Some(lat), Some(lon)) => Position::new(lat, lon),
        (None, None) => state
            .position
            .current_position()
            .ok_or(ApiError::Weather(WeatherError::NoPositionAvailable))?,
        _ => {
            return Err(ApiError::BadRequest(
                "lat and lon must be given together".into(),
            ))
        }
    };

    if !position.is_valid() {
        return Err(ApiError::BadRequest(format!(
            "position {} is out of range",
            position
        )));
    }
    Ok(position)
}

fn query_options(params: &PositionQuery) -> QueryOptions {
    QueryOptions {
        max_count: params.count,
    }
}
