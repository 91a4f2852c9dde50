//! HTTP surface of the node controller

use crate::service::NodeService;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use session_store::SessionRecord;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tsm_core::api::{
    NodeCopyKeyRequest, NodeGenerateKeyRequest, NodePresignRequest, NodeSignRequest,
    NodeSignResponse,
};
use tsm_core::http::{ApiError, ValidJson};
use tsm_core::SessionId;

pub fn build_router(service: Arc<NodeService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/generateKey", post(generate_key))
        .route("/v1/copyKey", post(copy_key))
        .route("/v1/presign", post(presign))
        .route("/v1/sign", post(sign))
        .route("/v1/sessions/:session_id", get(session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Health check endpoint
async fn health(State(service): State<Arc<NodeService>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "node-controller",
        "version": env!("CARGO_PKG_VERSION"),
        "player": service.role().index(),
    }))
}

async fn generate_key(
    State(service): State<Arc<NodeService>>,
    ValidJson(req): ValidJson<NodeGenerateKeyRequest>,
) -> Result<StatusCode, ApiError> {
    service.start_generate_key(req)?;
    Ok(StatusCode::OK)
}

async fn copy_key(
    State(service): State<Arc<NodeService>>,
    ValidJson(req): ValidJson<NodeCopyKeyRequest>,
) -> Result<StatusCode, ApiError> {
    service.start_copy_key(req)?;
    Ok(StatusCode::OK)
}

async fn presign(
    State(service): State<Arc<NodeService>>,
    ValidJson(req): ValidJson<NodePresignRequest>,
) -> Result<StatusCode, ApiError> {
    service.start_presign(req)?;
    Ok(StatusCode::OK)
}

async fn sign(
    State(service): State<Arc<NodeService>>,
    ValidJson(req): ValidJson<NodeSignRequest>,
) -> Result<Json<NodeSignResponse>, ApiError> {
    Ok(Json(service.partial_sign(req).await?))
}

async fn session(
    State(service): State<Arc<NodeService>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    let session_id: SessionId = session_id.parse()?;
    Ok(Json(service.session(&session_id)?))
}
