use crate::engine::{Evaluation, MemoryRuleEngine, RuleEngine};
use crate::error::RedirectError;
use crate::rules::Rule;
use crate::service::ServiceHandle;
use crate::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use redirect_common::{CaptureOutcome, Command, CommandResponse, ObservedRequest};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Shared state for metrics
#[derive(Debug, Default)]
pub struct Metrics {
    pub commands_total: AtomicU64,
    pub command_errors: AtomicU64,
    pub observations_total: AtomicU64,
    pub captures_total: AtomicU64,
    // Rule engine
    pub rule_updates: AtomicU64,
    pub engine_rejections: AtomicU64,
    pub store_errors: AtomicU64,
}

/// State shared by the admin handlers
#[derive(Clone)]
pub struct ApiState {
    pub service: ServiceHandle,
    pub engine: Arc<MemoryRuleEngine>,
    pub metrics: Arc<Metrics>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    installed_rules: usize,
}

#[derive(Serialize)]
struct MetricsResponse {
    commands_total: u64,
    command_errors: u64,
    observations_total: u64,
    captures_total: u64,
    engine: EngineMetrics,
}

#[derive(Serialize)]
struct EngineMetrics {
    rule_updates: u64,
    rejections: u64,
    store_errors: u64,
    rejection_rate: f64,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Error returned by the admin handlers when the service task is gone
struct ApiError(RedirectError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            RedirectError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<RedirectError> for ApiError {
    fn from(e: RedirectError) -> Self {
        ApiError(e)
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/command", post(command_handler))
        .route("/observe", post(observe_handler))
        .route("/rules", get(rules_handler))
        .route("/evaluate", post(evaluate_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Bind `addr` and serve the admin API until the server fails
pub async fn start_admin_server(addr: SocketAddr, state: ApiState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        RedirectError::Config(format!("Failed to bind admin address {}: {}", addr, e))
    })?;
    serve(listener, state).await
}

/// Serve the admin API on an already bound listener
pub async fn serve(listener: tokio::net::TcpListener, state: ApiState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Starting Admin API on {}", addr);
    }
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        installed_rules: state.engine.len().await,
    })
}

async fn metrics_handler(State(state): State<ApiState>) -> Json<MetricsResponse> {
    let metrics = &state.metrics;
    let rule_updates = metrics.rule_updates.load(Ordering::Relaxed);
    let rejections = metrics.engine_rejections.load(Ordering::Relaxed);

    let attempts = rule_updates + rejections;
    let rejection_rate = if attempts > 0 {
        (rejections as f64 / attempts as f64) * 100.0
    } else {
        0.0
    };

    Json(MetricsResponse {
        commands_total: metrics.commands_total.load(Ordering::Relaxed),
        command_errors: metrics.command_errors.load(Ordering::Relaxed),
        observations_total: metrics.observations_total.load(Ordering::Relaxed),
        captures_total: metrics.captures_total.load(Ordering::Relaxed),
        engine: EngineMetrics {
            rule_updates,
            rejections,
            store_errors: metrics.store_errors.load(Ordering::Relaxed),
            rejection_rate,
        },
    })
}

async fn command_handler(
    State(state): State<ApiState>,
    Json(command): Json<Command>,
) -> std::result::Result<Json<CommandResponse>, ApiError> {
    Ok(Json(state.service.execute(command).await?))
}

async fn observe_handler(
    State(state): State<ApiState>,
    Json(request): Json<ObservedRequest>,
) -> std::result::Result<Json<CaptureOutcome>, ApiError> {
    Ok(Json(state.service.observe(request).await?))
}

async fn rules_handler(
    State(state): State<ApiState>,
) -> std::result::Result<Json<Vec<Rule>>, ApiError> {
    Ok(Json(state.engine.rules().await?))
}

async fn evaluate_handler(
    State(state): State<ApiState>,
    Json(request): Json<ObservedRequest>,
) -> Json<Evaluation> {
    Json(state.engine.evaluate(&request).await)
}
