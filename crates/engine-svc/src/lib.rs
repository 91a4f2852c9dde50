//! Signing Engine Service
//!
//! HTTP host for a [`MemoryEngine`] cluster. Each request acts as the player
//! its `x-api-key` header is registered for.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tsm_core::engine::{wire, MemoryEngine, MemoryEngineNode, SigningEngine};
use tsm_core::http::{ApiError, ValidJson};
use tsm_core::types::b64;
use tsm_core::{Error, PlayerIndex};

/// Application state
pub struct AppState {
    engine: MemoryEngine,
    /// API key → player index
    api_keys: HashMap<String, PlayerIndex>,
}

impl AppState {
    pub fn new(engine: MemoryEngine) -> Self {
        Self {
            engine,
            api_keys: HashMap::new(),
        }
    }

    /// Register `api_key` as acting for `player`
    pub fn with_player(mut self, api_key: impl Into<String>, player: PlayerIndex) -> Self {
        self.api_keys.insert(api_key.into(), player);
        self
    }

    fn node(&self, headers: &HeaderMap) -> Result<MemoryEngineNode, ApiError> {
        let api_key = headers
            .get(wire::API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::invalid_input(format!("{} header is required", wire::API_KEY_HEADER)))?;

        let player = self
            .api_keys
            .get(api_key)
            .ok_or_else(|| Error::invalid_input("unknown API key"))?;
        Ok(self.engine.player(*player))
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(wire::GENERATE_KEY_PATH, post(generate_key))
        .route(wire::COPY_KEY_PATH, post(copy_key))
        .route(wire::PRESIGN_PATH, post(presign))
        .route(wire::SIGN_PATH, post(sign))
        .route(&format!("{}/:key_id", wire::PUBLIC_KEY_PATH), get(public_key))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "engine-svc",
        "version": env!("CARGO_PKG_VERSION"),
        "keys": state.engine.key_count(),
        "pendingSessions": state.engine.pending_sessions(),
    }))
}

async fn generate_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidJson(call): ValidJson<wire::GenerateKeyCall>,
) -> ApiResult<wire::KeyIdResponse> {
    let node = state.node(&headers)?;
    info!(session_id = %call.session_config.session_id, player = node.player(), "Generate key join");

    let key_id = node.generate_key(&call.session_config).await?;
    Ok(Json(wire::KeyIdResponse { key_id }))
}

async fn copy_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidJson(call): ValidJson<wire::CopyKeyCall>,
) -> ApiResult<wire::KeyIdResponse> {
    let node = state.node(&headers)?;
    info!(session_id = %call.session_config.session_id, player = node.player(), "Copy key join");

    let key_id = node
        .copy_key(&call.session_config, &call.existing_key_id)
        .await?;
    Ok(Json(wire::KeyIdResponse { key_id }))
}

async fn presign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidJson(call): ValidJson<wire::PresignCall>,
) -> ApiResult<wire::PresignaturesResponse> {
    let node = state.node(&headers)?;
    info!(
        session_id = %call.session_config.session_id,
        player = node.player(),
        count = call.count,
        "Presign join"
    );

    let presignature_ids = node
        .generate_presignatures(&call.session_config, &call.key_id, call.count)
        .await?;
    Ok(Json(wire::PresignaturesResponse { presignature_ids }))
}

async fn sign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidJson(call): ValidJson<wire::SignCall>,
) -> ApiResult<wire::PartialSignatureResponse> {
    let node = state.node(&headers)?;
    let message_hash = b64::decode_field("messageHash", &call.message_hash)?;

    let partial = node
        .sign_with_presignature(&call.key_id, &call.presignature_id, &message_hash)
        .await?;
    Ok(Json(partial.into()))
}

async fn public_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key_id): Path<String>,
) -> ApiResult<wire::PublicKeyResponse> {
    let node = state.node(&headers)?;
    let public_key = node.public_key(&key_id).await?;
    Ok(Json(wire::PublicKeyResponse {
        public_key: b64::encode(&public_key),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> Router {
        build_router(Arc::new(
            AppState::new(MemoryEngine::new()).with_player("key-1", 1),
        ))
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["keys"], 0);
    }

    #[tokio::test]
    async fn test_missing_api_key_rejected() {
        let response = router()
            .oneshot(
                Request::get("/v1/schnorr/publicKey/abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_key_is_engine_failure() {
        let response = router()
            .oneshot(
                Request::get("/v1/schnorr/publicKey/abc")
                    .header(wire::API_KEY_HEADER, "key-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["text"], "ENGINE_FAILURE");
    }

    #[tokio::test]
    async fn test_malformed_message_hash() {
        let body = serde_json::json!({
            "keyId": "k",
            "presignatureId": "p",
            "messageHash": "%%%"
        });
        let response = router()
            .oneshot(
                Request::post("/v1/schnorr/sign")
                    .header(wire::API_KEY_HEADER, "key-1")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
