//! HTTP front end over [`AnalysisService`].
//!
//! | Route | Body | Response |
//! |-------|------|----------|
//! | `GET /health` | | [`HealthReport`](crate::service::HealthReport) |
//! | `POST /analyze/zero-shot` | `{text, candidate_labels, multi_label?}` | `{sequence, labels, scores, selected}` |
//! | `POST /analyze/entities` | `{text}` | `{entities, grouped_entities}` |
//!
//! Failures answer `{"detail": "..."}` with 400 for bad input, 503 when a
//! model cannot serve and 500 otherwise.

use crate::config::ServerConfig;
use crate::error::RuntimeError;
use crate::ner::EntityAnalysis;
use crate::service::{AnalysisService, HealthReport, ZeroShotAnalysis};
use axum::{
    Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Deserialize)]
pub struct ZeroShotRequest {
    pub text: String,
    pub candidate_labels: Vec<String>,
    #[serde(default)]
    pub multi_label: bool,
}

#[derive(Debug, Deserialize)]
pub struct EntitiesRequest {
    pub text: String,
}

/// A [`RuntimeError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(RuntimeError);

impl From<RuntimeError> for ApiError {
    fn from(e: RuntimeError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            RuntimeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RuntimeError::Unavailable
            | RuntimeError::Timeout
            | RuntimeError::Load(_)
            | RuntimeError::ProviderNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn detail(operation: &str, error: &RuntimeError, status: StatusCode) -> String {
    match (error, status) {
        (RuntimeError::InvalidInput(msg), _) => msg.clone(),
        (_, StatusCode::SERVICE_UNAVAILABLE) => {
            format!("No model is available for {operation}. Please try again later.")
        }
        _ => format!("An internal error occurred during {operation}."),
    }
}

struct OperationError {
    operation: &'static str,
    error: ApiError,
}

impl IntoResponse for OperationError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let body = serde_json::json!({ "detail": detail(self.operation, &self.error.0, status) });
        (status, Json(body)).into_response()
    }
}

fn failed(operation: &'static str) -> impl FnOnce(RuntimeError) -> OperationError {
    move |e| OperationError {
        operation,
        error: e.into(),
    }
}

/// Router with every route, CORS restricted to `config.cors_origins`.
pub fn router(service: Arc<AnalysisService>, config: &ServerConfig) -> Router {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/analyze/zero-shot", post(zero_shot_handler))
        .route("/analyze/entities", post(entities_handler))
        .layer(cors)
        .with_state(service)
}

async fn health_handler(State(service): State<Arc<AnalysisService>>) -> Json<HealthReport> {
    Json(service.health().await)
}

async fn zero_shot_handler(
    State(service): State<Arc<AnalysisService>>,
    Json(req): Json<ZeroShotRequest>,
) -> Result<Json<ZeroShotAnalysis>, OperationError> {
    service
        .analyze_zero_shot(&req.text, &req.candidate_labels, req.multi_label)
        .await
        .map(Json)
        .map_err(failed("zero-shot analysis"))
}

async fn entities_handler(
    State(service): State<Arc<AnalysisService>>,
    Json(req): Json<EntitiesRequest>,
) -> Result<Json<EntityAnalysis>, OperationError> {
    service
        .analyze_entities(&req.text)
        .await
        .map(Json)
        .map_err(failed("entity extraction"))
}
