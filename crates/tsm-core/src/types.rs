//! Core types for the co-signer protocol

use crate::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 0-based slot of a party within a session
pub type PlayerIndex = usize;

/// Identifier the signing engine assigns to a key
pub type KeyId = String;

/// Identifier of a single-use presignature
pub type PresignatureId = String;

/// The mobile participant always occupies index 0.
pub const DYNAMIC_PLAYER: PlayerIndex = 0;

/// Fixed node that co-signs with the mobile participant.
pub const SIGNER_PLAYER: PlayerIndex = 1;

/// Players of key generation and key copy sessions
pub const KEYGEN_PLAYERS: [PlayerIndex; 3] = [0, 1, 2];

/// Players of presign and sign sessions
pub const SIGN_PLAYERS: [PlayerIndex; 2] = [0, 1];

/// Shared rendezvous token for one protocol run.
///
/// Minted from 32 bytes of OS randomness and rendered as URL-safe base64
/// without padding. It is the only value correlating the independently
/// scheduled joins, so it has to be unguessable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh session identifier
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::invalid_input("sessionId is required"));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of protocol run a session was minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    GenerateKey,
    CopyKey,
    PreSign,
    PartialSign,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::GenerateKey => "generateKey",
            OperationKind::CopyKey => "copyKey",
            OperationKind::PreSign => "preSign",
            OperationKind::PartialSign => "partialSign",
        }
    }

    /// Participants taking part in this kind of session
    pub fn players(&self) -> &'static [PlayerIndex] {
        match self {
            OperationKind::GenerateKey | OperationKind::CopyKey => &KEYGEN_PLAYERS,
            OperationKind::PreSign | OperationKind::PartialSign => &SIGN_PLAYERS,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a fixed co-signer node, configured as "1" or "2"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    One,
    Two,
}

impl NodeRole {
    /// This node's player index
    pub fn index(self) -> PlayerIndex {
        match self {
            NodeRole::One => 1,
            NodeRole::Two => 2,
        }
    }

    /// The other fixed node
    pub fn peer(self) -> NodeRole {
        match self {
            NodeRole::One => NodeRole::Two,
            NodeRole::Two => NodeRole::One,
        }
    }

    pub fn peer_index(self) -> PlayerIndex {
        self.peer().index()
    }

    /// Only node 1 joins presign and sign sessions.
    pub fn is_signer(self) -> bool {
        self.index() == SIGNER_PLAYER
    }
}

impl FromStr for NodeRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(NodeRole::One),
            "2" => Ok(NodeRole::Two),
            other => Err(Error::configuration(format!(
                "invalid player index {other:?}, expected \"1\" or \"2\""
            ))),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// One participant's share of a signature over a presignature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSignature {
    /// Producing player
    pub player: PlayerIndex,
    /// Presignature the share was computed from
    pub presignature_id: PresignatureId,
    /// Engine-specific signature fragment
    pub data: Vec<u8>,
}

/// Schnorr signature (R, s)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Nonce commitment R (compressed SEC1)
    pub r: Vec<u8>,
    /// Response scalar
    pub s: [u8; 32],
}

impl Signature {
    /// Encoded length: compressed R followed by s
    pub const LEN: usize = 33 + 32;

    pub fn new(r: Vec<u8>, s: [u8; 32]) -> Self {
        Self { r, s }
    }

    /// Convert to bytes (R || s)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::LEN);
        bytes.extend_from_slice(&self.r);
        bytes.extend_from_slice(&self.s);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(Error::invalid_input(format!(
                "signature must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        let mut s = [0u8; 32];
        s.copy_from_slice(&bytes[33..]);
        Ok(Self::new(bytes[..33].to_vec(), s))
    }
}

/// Standard base64 used for public keys, hashes and signature fragments
pub mod b64 {
    use crate::{Error, Result};
    use base64::{engine::general_purpose::STANDARD, Engine};

    pub fn encode(data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    /// Decode a caller-supplied field; failures are the caller's fault.
    pub fn decode_field(field: &str, value: &str) -> Result<Vec<u8>> {
        STANDARD
            .decode(value)
            .map_err(|e| Error::invalid_input(format!("{field} is not valid base64: {e}")))
    }
}
