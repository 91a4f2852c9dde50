//! JSON bodies exchanged by the gateway, the node controllers and clients
//!
//! Only primitive fields travel between services. Session configurations are
//! always re-derived by the receiver.

use crate::error::ErrorKind;
use crate::types::{KeyId, PresignatureId, SessionId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Gateway `POST /v1/generateKey`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyRequest {
    pub public_key: String,
}

/// Gateway `POST /v1/copyKey`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyKeyRequest {
    pub public_key: String,
    pub key_id: KeyId,
}

/// Gateway `POST /v1/preSign`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreSignRequest {
    pub public_key: String,
    pub key_id: KeyId,
    pub count: u64,
}

/// Response of every gateway session-starting call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: SessionId,
}

/// Gateway `POST /v1/finalizeSign`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeSignRequest {
    pub pre_signature_id: PresignatureId,
    pub message_hash: String,
    pub key_id: KeyId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeSignResponse {
    pub partial_sign_result: String,
}

/// Node `POST /v1/generateKey`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGenerateKeyRequest {
    pub session_id: SessionId,
    pub public_key: String,
    /// Gateway's digest of the configuration it expects this node to derive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_digest: Option<String>,
}

/// Node `POST /v1/copyKey`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCopyKeyRequest {
    pub session_id: SessionId,
    pub public_key: String,
    pub existing_key_id: KeyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_digest: Option<String>,
}

/// Node `POST /v1/presign`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePresignRequest {
    pub session_id: SessionId,
    pub public_key: String,
    pub key_id: KeyId,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_digest: Option<String>,
}

/// Node `POST /v1/sign`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSignRequest {
    pub sign_signature_id: PresignatureId,
    pub message_hash: String,
    pub key_id: KeyId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSignResponse {
    pub signature: String,
}

/// Inner error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub text: ErrorKind,
    pub message: String,
}

/// `{"error": {"text": ..., "message": ...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn into_error(self) -> Error {
        Error::from_kind(self.error.text, self.error.message)
    }
}

impl From<&Error> for ErrorEnvelope {
    fn from(err: &Error) -> Self {
        Self {
            error: ErrorBody {
                text: err.kind(),
                message: err.message().to_string(),
            },
        }
    }
}

/// Required-field checks applied before any work is done
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_input(format!("{field} is required")));
    }
    Ok(())
}

pub(crate) fn require_count(count: u64) -> Result<()> {
    if count == 0 {
        return Err(Error::invalid_input("count must be greater than 0"));
    }
    Ok(())
}

impl Validate for GenerateKeyRequest {
    fn validate(&self) -> Result<()> {
        require("publicKey", &self.public_key)
    }
}

impl Validate for CopyKeyRequest {
    fn validate(&self) -> Result<()> {
        require("publicKey", &self.public_key)?;
        require("keyId", &self.key_id)
    }
}

impl Validate for PreSignRequest {
    fn validate(&self) -> Result<()> {
        require("publicKey", &self.public_key)?;
        require("keyId", &self.key_id)?;
        require_count(self.count)
    }
}

impl Validate for FinalizeSignRequest {
    fn validate(&self) -> Result<()> {
        require("preSignatureId", &self.pre_signature_id)?;
        require("messageHash", &self.message_hash)?;
        require("keyId", &self.key_id)
    }
}

impl Validate for NodeGenerateKeyRequest {
    fn validate(&self) -> Result<()> {
        require("sessionId", self.session_id.as_str())?;
        require("publicKey", &self.public_key)
    }
}

impl Validate for NodeCopyKeyRequest {
    fn validate(&self) -> Result<()> {
        require("sessionId", self.session_id.as_str())?;
        require("publicKey", &self.public_key)?;
        require("existingKeyId", &self.existing_key_id)
    }
}

impl Validate for NodePresignRequest {
    fn validate(&self) -> Result<()> {
        require("sessionId", self.session_id.as_str())?;
        require("publicKey", &self.public_key)?;
        require("keyId", &self.key_id)?;
        require_count(self.count)
    }
}

impl Validate for NodeSignRequest {
    fn validate(&self) -> Result<()> {
        require("signSignatureId", &self.sign_signature_id)?;
        require("messageHash", &self.message_hash)?;
        require("keyId", &self.key_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gateway_bodies_use_camel_case() {
        let req: FinalizeSignRequest = serde_json::from_value(json!({
            "preSignatureId": "p1",
            "messageHash": "aGFzaA==",
            "keyId": "k1"
        }))
        .unwrap();
        assert_eq!(req.pre_signature_id, "p1");

        let resp = serde_json::to_value(FinalizeSignResponse {
            partial_sign_result: "c2ln".into(),
        })
        .unwrap();
        assert_eq!(resp, json!({ "partialSignResult": "c2ln" }));
    }

    #[test]
    fn test_config_digest_is_optional() {
        let req: NodeGenerateKeyRequest = serde_json::from_value(json!({
            "sessionId": "abc",
            "publicKey": "AA=="
        }))
        .unwrap();
        assert!(req.config_digest.is_none());

        let body = serde_json::to_value(&req).unwrap();
        assert!(body.get("configDigest").is_none());
    }

    #[test]
    fn test_missing_or_empty_fields_rejected() {
        let req = PreSignRequest {
            public_key: "AA==".into(),
            key_id: "k".into(),
            count: 0,
        };
        assert!(matches!(req.validate(), Err(Error::InvalidInput(_))));

        let req = NodeSignRequest {
            sign_signature_id: String::new(),
            message_hash: "AA==".into(),
            key_id: "k".into(),
        };
        assert!(matches!(req.validate(), Err(Error::InvalidInput(msg)) if msg.contains("signSignatureId")));
    }

    #[test]
    fn test_error_envelope_shape() {
        let err = Error::invalid_input("messageHash is not valid base64");
        let body = serde_json::to_value(ErrorEnvelope::from(&err)).unwrap();
        assert_eq!(
            body,
            json!({ "error": { "text": "INVALID_INPUT", "message": "messageHash is not valid base64" } })
        );

        let back: ErrorEnvelope = serde_json::from_value(body).unwrap();
        assert!(matches!(back.into_error(), Error::InvalidInput(_)));
    }
}
