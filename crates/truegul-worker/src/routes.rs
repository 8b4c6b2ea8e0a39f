//! HTTP routes and handlers

use crate::analysis::AnalysisServices;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use truegul_core::{ErrorCode, InferenceError, WritingKind};

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub services: AnalysisServices,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(services: AnalysisServices, metrics: Option<PrometheusHandle>) -> Self {
        Self { services, metrics }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/analyze", post(analyze))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({"message": "TrueGul ML Server"}))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy"}))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Synchronous analyze request
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
    #[serde(default = "default_writing_type")]
    pub writing_type: String,
}

fn default_writing_type() -> String {
    WritingKind::Essay.as_str().to_string()
}

/// Synchronous analyze response
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub ai_score: f64,
    pub feedback: String,
    pub model_version: String,
}

fn error_response(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"code": code, "message": message.into()})),
    )
        .into_response()
}

fn failure_response(e: &InferenceError) -> Response {
    let status = match e.code() {
        ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.code(), e.to_string())
}

async fn analyze(State(state): State<AppState>, Json(request): Json<AnalyzeRequest>) -> Response {
    if request.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, "Text cannot be empty");
    }

    let kind: WritingKind = match request.writing_type.parse() {
        Ok(kind) => kind,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, e.to_string())
        }
    };

    match state.services.analyze(&request.text, kind).await {
        Ok(result) => {
            info!(
                "Analyzed {} via API: ai_score={:.2}, latency={}ms",
                kind, result.ai_probability, result.latency_ms
            );
            Json(AnalyzeResponse {
                ai_score: result.ai_probability,
                feedback: result.feedback,
                model_version: state.services.model_version.clone(),
            })
            .into_response()
        }
        Err(e) => {
            error!("Analysis request failed: {}", e);
            failure_response(&e)
        }
    }
}
