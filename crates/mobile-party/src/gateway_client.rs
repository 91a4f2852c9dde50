//! Gateway Client
//!
//! Client library for the gateway's public API.

use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use session_store::{SessionRecord, SessionState};
use std::time::Duration;
use tracing::{debug, instrument};
use tsm_core::api::{
    CopyKeyRequest, ErrorEnvelope, FinalizeSignRequest, FinalizeSignResponse, GenerateKeyRequest,
    PreSignRequest, SessionResponse,
};
use tsm_core::types::b64;
use tsm_core::{Error, Result, SessionId};

/// HTTP-based gateway client
#[derive(Clone)]
pub struct GatewayClient {
    /// HTTP client
    client: Client,
    /// Gateway URL
    url: String,
    /// Request timeout
    timeout: Duration,
    /// Delay between session status polls
    poll_interval: Duration,
}

impl GatewayClient {
    /// Create a new gateway client
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[instrument(skip_all)]
    pub async fn generate_key(&self, public_key: &str) -> Result<SessionId> {
        let req = GenerateKeyRequest {
            public_key: public_key.to_string(),
        };
        let response: SessionResponse = self.post("/v1/generateKey", &req).await?;
        debug!(session_id = %response.session_id, "Key generation dispatched");
        Ok(response.session_id)
    }

    #[instrument(skip(self, public_key))]
    pub async fn copy_key(&self, public_key: &str, key_id: &str) -> Result<SessionId> {
        let req = CopyKeyRequest {
            public_key: public_key.to_string(),
            key_id: key_id.to_string(),
        };
        let response: SessionResponse = self.post("/v1/copyKey", &req).await?;
        debug!(session_id = %response.session_id, "Key copy dispatched");
        Ok(response.session_id)
    }

    #[instrument(skip(self, public_key))]
    pub async fn pre_sign(&self, public_key: &str, key_id: &str, count: u64) -> Result<SessionId> {
        let req = PreSignRequest {
            public_key: public_key.to_string(),
            key_id: key_id.to_string(),
            count,
        };
        let response: SessionResponse = self.post("/v1/preSign", &req).await?;
        debug!(session_id = %response.session_id, "Presign dispatched");
        Ok(response.session_id)
    }

    /// The signer node's partial signature, decoded
    #[instrument(skip(self, message_hash))]
    pub async fn finalize_sign(
        &self,
        key_id: &str,
        presignature_id: &str,
        message_hash: &[u8],
    ) -> Result<Vec<u8>> {
        let req = FinalizeSignRequest {
            pre_signature_id: presignature_id.to_string(),
            message_hash: b64::encode(message_hash),
            key_id: key_id.to_string(),
        };
        let response: FinalizeSignResponse = self.post("/v1/finalizeSign", &req).await?;
        b64::decode_field("partialSignResult", &response.partial_sign_result)
            .map_err(|e| Error::transport(format!("gateway returned {}", e.message())))
    }

    pub async fn session(&self, session_id: &SessionId) -> Result<SessionRecord> {
        let response = self
            .client
            .get(format!("{}/v1/sessions/{}", self.url, session_id))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        decode(response).await
    }

    /// Wait until the gateway has settled `session_id`.
    ///
    /// Fails with the recorded error once any node refused the join, could
    /// not be reached, or reported a failed engine join.
    pub async fn wait_for_dispatch(&self, session_id: &SessionId) -> Result<()> {
        loop {
            let record = self.session(session_id).await?;
            match record.state {
                SessionState::Failed => {
                    return Err(Error::transport(record.error.unwrap_or_else(|| {
                        format!("session {session_id} could not be dispatched")
                    })))
                }
                state if state.is_terminal() => return Ok(()),
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    /// Check that the gateway answers
    pub async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::transport(format!(
                "health check failed with status: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let response = self
            .client
            .post(format!("{}{}", self.url, path))
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::transport(format!("POST {path} failed: {e}")))?;

        decode(response).await
    }
}

/// Map a gateway response to its body, or to the error it reported
async fn decode<R: DeserializeOwned>(response: Response) -> Result<R> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => envelope.into_error(),
            Err(_) => Error::transport(format!("gateway answered {status}: {text}")),
        });
    }

    response
        .json()
        .await
        .map_err(|e| Error::transport(format!("gateway returned an invalid body: {e}")))
}
