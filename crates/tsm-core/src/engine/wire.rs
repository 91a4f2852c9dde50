//! JSON bodies of the signing engine's HTTP API

use crate::api::{require, require_count, Validate};
use crate::types::b64;
use crate::{KeyId, PartialSignature, PlayerIndex, PresignatureId, Result, SessionConfig};
use serde::{Deserialize, Serialize};

pub const GENERATE_KEY_PATH: &str = "/v1/schnorr/generateKey";
pub const COPY_KEY_PATH: &str = "/v1/schnorr/copyKey";
pub const PRESIGN_PATH: &str = "/v1/schnorr/presign";
pub const SIGN_PATH: &str = "/v1/schnorr/sign";
pub const PUBLIC_KEY_PATH: &str = "/v1/schnorr/publicKey";

/// Header carrying the API key that selects the engine player
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyCall {
    pub session_config: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyKeyCall {
    pub session_config: SessionConfig,
    /// Empty for players that do not hold the key
    #[serde(default)]
    pub existing_key_id: KeyId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignCall {
    pub session_config: SessionConfig,
    pub key_id: KeyId,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignCall {
    pub key_id: KeyId,
    pub presignature_id: PresignatureId,
    /// Base64 message hash
    pub message_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyIdResponse {
    pub key_id: KeyId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignaturesResponse {
    pub presignature_ids: Vec<PresignatureId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSignatureResponse {
    pub player: PlayerIndex,
    pub presignature_id: PresignatureId,
    /// Base64 signature fragment
    pub partial_signature: String,
}

impl From<PartialSignature> for PartialSignatureResponse {
    fn from(partial: PartialSignature) -> Self {
        Self {
            player: partial.player,
            presignature_id: partial.presignature_id,
            partial_signature: b64::encode(&partial.data),
        }
    }
}

impl PartialSignatureResponse {
    pub fn into_partial(self) -> Result<PartialSignature> {
        Ok(PartialSignature {
            player: self.player,
            presignature_id: self.presignature_id,
            data: b64::decode_field("partialSignature", &self.partial_signature)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    /// Base64 compressed public key
    pub public_key: String,
}

impl Validate for GenerateKeyCall {
    fn validate(&self) -> Result<()> {
        require("sessionConfig.sessionId", self.session_config.session_id.as_str())
    }
}

impl Validate for CopyKeyCall {
    fn validate(&self) -> Result<()> {
        require("sessionConfig.sessionId", self.session_config.session_id.as_str())
    }
}

impl Validate for PresignCall {
    fn validate(&self) -> Result<()> {
        require("sessionConfig.sessionId", self.session_config.session_id.as_str())?;
        require("keyId", &self.key_id)?;
        require_count(self.count)
    }
}

impl Validate for SignCall {
    fn validate(&self) -> Result<()> {
        require("keyId", &self.key_id)?;
        require("presignatureId", &self.presignature_id)?;
        require("messageHash", &self.message_hash)
    }
}
