//! Signing Engine Client
//!
//! Client library for one player's signing engine node. The API key selects
//! which player the engine acts as.

use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use tsm_core::api::ErrorEnvelope;
use tsm_core::engine::{async_trait, wire, SigningEngine};
use tsm_core::types::b64;
use tsm_core::{Error, KeyId, PartialSignature, PresignatureId, Result, SessionConfig};

/// Default per-request timeout; MPC rounds wait for every player to join.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP-based engine client
#[derive(Clone)]
pub struct EngineClient {
    /// HTTP client
    client: Client,
    /// Engine node URL
    url: String,
    /// API key identifying this player
    api_key: String,
    /// Request timeout
    timeout: Duration,
}

impl EngineClient {
    /// Create a new engine client
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.url, path))
            .header(wire::API_KEY_HEADER, &self.api_key)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::engine(format!("POST {path} failed: {e}")))?;

        decode(path, response).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let response = self
            .client
            .get(format!("{}{}", self.url, path))
            .header(wire::API_KEY_HEADER, &self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::engine(format!("GET {path} failed: {e}")))?;

        decode(path, response).await
    }

    /// Check that the engine node answers
    pub async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| Error::engine(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::engine(format!(
                "health check failed with status: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Map an engine response to the body or an engine failure
async fn decode<R: DeserializeOwned>(path: &str, response: Response) -> Result<R> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => envelope.error.message,
            Err(_) => text,
        };
        return Err(Error::engine(format!("{path} failed with status {status}: {message}")));
    }

    response
        .json()
        .await
        .map_err(|e| Error::engine(format!("{path} returned an invalid body: {e}")))
}

#[async_trait]
impl SigningEngine for EngineClient {
    #[instrument(skip_all, fields(session_id = %config.session_id))]
    async fn generate_key(&self, config: &SessionConfig) -> Result<KeyId> {
        let call = wire::GenerateKeyCall {
            session_config: config.clone(),
        };
        let response: wire::KeyIdResponse = self.post(wire::GENERATE_KEY_PATH, &call).await?;
        debug!(key_id = %response.key_id, "Key generated");
        Ok(response.key_id)
    }

    #[instrument(skip_all, fields(session_id = %config.session_id))]
    async fn copy_key(&self, config: &SessionConfig, existing_key_id: &str) -> Result<KeyId> {
        let call = wire::CopyKeyCall {
            session_config: config.clone(),
            existing_key_id: existing_key_id.to_string(),
        };
        let response: wire::KeyIdResponse = self.post(wire::COPY_KEY_PATH, &call).await?;
        debug!(key_id = %response.key_id, "Key copied");
        Ok(response.key_id)
    }

    #[instrument(skip_all, fields(session_id = %config.session_id, key_id = %key_id, count = count))]
    async fn generate_presignatures(
        &self,
        config: &SessionConfig,
        key_id: &str,
        count: u64,
    ) -> Result<Vec<PresignatureId>> {
        let call = wire::PresignCall {
            session_config: config.clone(),
            key_id: key_id.to_string(),
            count,
        };
        let response: wire::PresignaturesResponse = self.post(wire::PRESIGN_PATH, &call).await?;
        Ok(response.presignature_ids)
    }

    #[instrument(skip(self, message_hash))]
    async fn sign_with_presignature(
        &self,
        key_id: &str,
        presignature_id: &str,
        message_hash: &[u8],
    ) -> Result<PartialSignature> {
        let call = wire::SignCall {
            key_id: key_id.to_string(),
            presignature_id: presignature_id.to_string(),
            message_hash: b64::encode(message_hash),
        };
        let response: wire::PartialSignatureResponse = self.post(wire::SIGN_PATH, &call).await?;
        response
            .into_partial()
            .map_err(|e| Error::engine(e.message().to_string()))
    }

    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>> {
        let response: wire::PublicKeyResponse = self
            .get(&format!("{}/{}", wire::PUBLIC_KEY_PATH, key_id))
            .await?;
        b64::decode_field("publicKey", &response.public_key)
            .map_err(|e| Error::engine(e.message().to_string()))
    }
}
