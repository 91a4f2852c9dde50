//! HTTP surface of the gateway

use crate::dispatch::Dispatcher;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use session_store::SessionRecord;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tsm_core::api::{
    CopyKeyRequest, FinalizeSignRequest, FinalizeSignResponse, GenerateKeyRequest, PreSignRequest,
    SessionResponse,
};
use tsm_core::http::{ApiError, ValidJson};
use tsm_core::SessionId;

pub fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/generateKey", post(generate_key))
        .route("/v1/copyKey", post(copy_key))
        .route("/v1/preSign", post(pre_sign))
        .route("/v1/finalizeSign", post(finalize_sign))
        .route("/v1/sessions/:session_id", get(session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(dispatcher)
}

/// Health check endpoint
async fn health(State(dispatcher): State<Arc<Dispatcher>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "peers": dispatcher.peers().iter().map(|p| p.url.as_str()).collect::<Vec<_>>(),
        "sessions": dispatcher.store().len(),
    }))
}

// The session-starting calls answer with the id as soon as the joins are
// dispatched; outcomes land in the session registry.

async fn generate_key(
    State(dispatcher): State<Arc<Dispatcher>>,
    ValidJson(req): ValidJson<GenerateKeyRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let dispatch = dispatcher.generate_key(&req)?;
    Ok(Json(SessionResponse {
        session_id: dispatch.session_id,
    }))
}

async fn copy_key(
    State(dispatcher): State<Arc<Dispatcher>>,
    ValidJson(req): ValidJson<CopyKeyRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let dispatch = dispatcher.copy_key(&req)?;
    Ok(Json(SessionResponse {
        session_id: dispatch.session_id,
    }))
}

async fn pre_sign(
    State(dispatcher): State<Arc<Dispatcher>>,
    ValidJson(req): ValidJson<PreSignRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let dispatch = dispatcher.presign(&req)?;
    Ok(Json(SessionResponse {
        session_id: dispatch.session_id,
    }))
}

async fn finalize_sign(
    State(dispatcher): State<Arc<Dispatcher>>,
    ValidJson(req): ValidJson<FinalizeSignRequest>,
) -> Result<Json<FinalizeSignResponse>, ApiError> {
    Ok(Json(dispatcher.partial_sign(&req).await?))
}

async fn session(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    let session_id: SessionId = session_id.parse()?;
    Ok(Json(dispatcher.session(&session_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Peer;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use session_store::SessionStore;
    use tower::ServiceExt;
    use tsm_core::types::b64;

    fn app() -> Router {
        let peers = vec![Peer::new(1, "http://127.0.0.1:1"), Peer::new(2, "http://127.0.0.1:1")];
        let signer = Peer::new(1, "http://127.0.0.1:1");
        build_router(Arc::new(Dispatcher::new(peers, signer, SessionStore::new(3600))))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_generate_key_returns_session_id() {
        let app = app();

        let response = app
            .clone()
            .oneshot(post_json("/v1/generateKey", json!({ "publicKey": b64::encode(b"mobile") })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session_id = body_json(response).await["sessionId"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(session_id.len(), 43);

        let response = app
            .oneshot(
                Request::get(format!("/v1/sessions/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["kind"], "generateKey");
    }

    #[tokio::test]
    async fn test_zero_count_is_invalid_input() {
        let response = app()
            .oneshot(post_json(
                "/v1/preSign",
                json!({ "publicKey": b64::encode(b"mobile"), "keyId": "k", "count": 0 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["text"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_finalize_sign_with_malformed_hash() {
        let response = app()
            .oneshot(post_json(
                "/v1/finalizeSign",
                json!({ "preSignatureId": "p", "messageHash": "***", "keyId": "k" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["text"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_finalize_sign_with_unreachable_signer() {
        let response = app()
            .oneshot(post_json(
                "/v1/finalizeSign",
                json!({ "preSignatureId": "p", "messageHash": b64::encode(&[7u8; 32]), "keyId": "k" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"]["text"], "TRANSPORT_FAILURE");
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let response = app()
            .oneshot(Request::get("/v1/sessions/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
