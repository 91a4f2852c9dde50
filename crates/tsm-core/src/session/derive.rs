//! Session configuration derivation
//!
//! Every party derives the configuration locally from primitive inputs: the
//! session id and the caller's public key travel over the wire, the fixed
//! nodes' keys come from each deployment's static configuration. Nothing
//! else is trusted.

use super::SessionConfig;
use crate::types::{b64, NodeRole, OperationKind, SessionId};
use crate::{Error, Result, DEFAULT_CURVE};
use tracing::debug;

/// Static key material of one node controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeKeys {
    /// Which fixed player this node is
    pub role: NodeRole,
    /// This node's public key
    pub node_public_key: Vec<u8>,
    /// The other fixed node's public key
    pub peer_public_key: Vec<u8>,
}

impl NodeKeys {
    pub fn new(role: NodeRole, node_public_key: Vec<u8>, peer_public_key: Vec<u8>) -> Self {
        Self {
            role,
            node_public_key,
            peer_public_key,
        }
    }

    /// Parse deployment configuration.
    ///
    /// Everything here comes from the operator, so every failure is a
    /// configuration fault rather than invalid input.
    pub fn from_base64(role: &str, node_public_key: &str, peer_public_key: &str) -> Result<Self> {
        let role: NodeRole = role.parse()?;
        let node_public_key = decode_static("NODE_PUBLIC_KEY", node_public_key)?;
        let peer_public_key = decode_static("ANOTHER_NODE_PUBLIC_KEY", peer_public_key)?;
        Ok(Self::new(role, node_public_key, peer_public_key))
    }

    /// The same keys seen from the gateway's side, by player index
    pub fn as_fixed(&self) -> FixedNodeKeys {
        match self.role {
            NodeRole::One => FixedNodeKeys::new(
                self.node_public_key.clone(),
                self.peer_public_key.clone(),
            ),
            NodeRole::Two => FixedNodeKeys::new(
                self.peer_public_key.clone(),
                self.node_public_key.clone(),
            ),
        }
    }
}

/// Public keys of both fixed nodes, indexed by player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedNodeKeys {
    pub player1: Vec<u8>,
    pub player2: Vec<u8>,
}

impl FixedNodeKeys {
    pub fn new(player1: Vec<u8>, player2: Vec<u8>) -> Self {
        Self { player1, player2 }
    }

    pub fn from_base64(player1: &str, player2: &str) -> Result<Self> {
        Ok(Self::new(
            decode_static("NODE1_PUBLIC_KEY", player1)?,
            decode_static("NODE2_PUBLIC_KEY", player2)?,
        ))
    }

    /// Key generation / copy configuration as any node derives it
    pub fn keygen_session(
        &self,
        session_id: SessionId,
        kind: OperationKind,
        dynamic_public_key: &str,
    ) -> Result<SessionConfig> {
        ensure_keygen_kind(kind)?;
        let dynamic = b64::decode_field("publicKey", dynamic_public_key)?;
        Ok(SessionConfig::keygen(
            session_id,
            kind,
            dynamic,
            self.player1.clone(),
            self.player2.clone(),
        ))
    }

    /// Presign configuration as the signer node derives it
    pub fn sign_session(
        &self,
        session_id: SessionId,
        dynamic_public_key: &str,
    ) -> Result<SessionConfig> {
        let dynamic = b64::decode_field("publicKey", dynamic_public_key)?;
        Ok(SessionConfig::sign(session_id, dynamic, self.player1.clone()))
    }
}

/// Derives session configurations on a node controller
#[derive(Debug, Clone)]
pub struct SessionDeriver {
    keys: NodeKeys,
    curve: String,
}

impl SessionDeriver {
    pub fn new(keys: NodeKeys) -> Self {
        Self {
            keys,
            curve: DEFAULT_CURVE.to_string(),
        }
    }

    /// Set the curve name put into derived configurations
    pub fn with_curve(mut self, curve: impl Into<String>) -> Self {
        self.curve = curve.into();
        self
    }

    pub fn role(&self) -> NodeRole {
        self.keys.role
    }

    pub fn keys(&self) -> &NodeKeys {
        &self.keys
    }

    pub fn curve(&self) -> &str {
        &self.curve
    }

    /// Configuration for a generate-key session
    pub fn generate_key_session(
        &self,
        session_id: SessionId,
        dynamic_public_key: &str,
    ) -> Result<SessionConfig> {
        self.keygen_session(session_id, OperationKind::GenerateKey, dynamic_public_key)
    }

    /// Configuration for a copy-key session
    pub fn copy_key_session(
        &self,
        session_id: SessionId,
        dynamic_public_key: &str,
    ) -> Result<SessionConfig> {
        self.keygen_session(session_id, OperationKind::CopyKey, dynamic_public_key)
    }

    fn keygen_session(
        &self,
        session_id: SessionId,
        kind: OperationKind,
        dynamic_public_key: &str,
    ) -> Result<SessionConfig> {
        let config = self
            .keys
            .as_fixed()
            .keygen_session(session_id, kind, dynamic_public_key)?
            .with_curve(self.curve.clone());

        debug!(
            session_id = %config.session_id,
            role = %self.keys.role,
            keys = ?config.key_fingerprints(),
            "Derived keygen session config"
        );
        Ok(config)
    }

    /// Configuration for a presign session.
    ///
    /// Only the designated signer may build one; any other node gets a
    /// configuration fault instead of silently standing in as signer.
    pub fn presign_session(
        &self,
        session_id: SessionId,
        dynamic_public_key: &str,
    ) -> Result<SessionConfig> {
        if !self.keys.role.is_signer() {
            return Err(Error::configuration(format!(
                "player {} is not allowed to sign",
                self.keys.role
            )));
        }

        let dynamic = b64::decode_field("publicKey", dynamic_public_key)?;
        let config = SessionConfig::sign(session_id, dynamic, self.keys.node_public_key.clone())
            .with_curve(self.curve.clone());

        debug!(
            session_id = %config.session_id,
            keys = ?config.key_fingerprints(),
            "Derived sign session config"
        );
        Ok(config)
    }
}

fn ensure_keygen_kind(kind: OperationKind) -> Result<()> {
    match kind {
        OperationKind::GenerateKey | OperationKind::CopyKey => Ok(()),
        other => Err(Error::Internal(format!(
            "{other} is not a key generation operation"
        ))),
    }
}

fn decode_static(name: &str, value: &str) -> Result<Vec<u8>> {
    if value.trim().is_empty() {
        return Err(Error::configuration(format!("{name} is not set")));
    }
    b64::decode_field(name, value)
        .map_err(|e| Error::configuration(e.message().to_string()))
}
