#![forbid(unsafe_code)]

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use draftkeep_adapter::{
    spawn_tick_worker, AdapterConfig, AdapterError, AdapterErrorResponse, AdapterHealthResponse,
    AdapterRuntime, BlurRequest, FieldInputResponse, FormSnapshotResponse, ProgressResponse,
    SubmitResponse,
};
use draftkeep_kernel_contracts::form::{FormRecord, InputEvent};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<AdapterErrorResponse>)>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AdapterConfig::from_env()?;
    let runtime = AdapterRuntime::new(&config)?;
    let tick_worker = spawn_tick_worker(runtime.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/form", get(form_snapshot))
        .route("/v1/form/input", post(form_input))
        .route("/v1/form/values", post(form_values))
        .route("/v1/form/blur", post(form_blur))
        .route("/v1/form/submit", post(form_submit))
        .route("/v1/form/reset", post(form_reset))
        .route("/v1/form/progress", get(form_progress))
        .with_state(runtime.clone());

    tracing::info!(
        addr = %config.http_bind,
        tick_interval_ms = config.tick_interval_ms,
        "draftkeep_adapter_http listening"
    );
    let listener = tokio::net::TcpListener::bind(config.http_bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(err) = runtime.shutdown() {
        tracing::warn!(error = %err, "teardown on shutdown failed");
    }
    tick_worker.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl_c listener failed; shutting down");
    }
    tracing::info!("shutdown requested");
}

fn reject(err: AdapterError) -> (StatusCode, Json<AdapterErrorResponse>) {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::warn!(error = %err, "request failed");
    }
    (status, Json(AdapterErrorResponse::from(&err)))
}

async fn healthz(State(runtime): State<AdapterRuntime>) -> (StatusCode, Json<AdapterHealthResponse>) {
    let report = runtime.health_report();
    let status = if report.reason.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn form_snapshot(State(runtime): State<AdapterRuntime>) -> ApiResult<FormSnapshotResponse> {
    runtime.snapshot().map(Json).map_err(reject)
}

async fn form_input(
    State(runtime): State<AdapterRuntime>,
    Json(event): Json<InputEvent>,
) -> ApiResult<FieldInputResponse> {
    runtime.input(event).map(Json).map_err(reject)
}

async fn form_values(
    State(runtime): State<AdapterRuntime>,
    Json(partial): Json<FormRecord>,
) -> ApiResult<FormSnapshotResponse> {
    runtime.set_values(partial).map(Json).map_err(reject)
}

async fn form_blur(
    State(runtime): State<AdapterRuntime>,
    Json(request): Json<BlurRequest>,
) -> ApiResult<FormSnapshotResponse> {
    runtime.blur(request).map(Json).map_err(reject)
}

async fn form_submit(State(runtime): State<AdapterRuntime>) -> ApiResult<SubmitResponse> {
    runtime.submit().map(Json).map_err(reject)
}

async fn form_reset(State(runtime): State<AdapterRuntime>) -> ApiResult<FormSnapshotResponse> {
    runtime.reset().map(Json).map_err(reject)
}

#[derive(Debug, Deserialize)]
struct ProgressQuery {
    mode: Option<String>,
}

async fn form_progress(
    State(runtime): State<AdapterRuntime>,
    Query(query): Query<ProgressQuery>,
) -> ApiResult<ProgressResponse> {
    runtime
        .progress(query.mode.as_deref())
        .map(Json)
        .map_err(reject)
}
