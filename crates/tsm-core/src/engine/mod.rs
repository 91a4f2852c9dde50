//! Signing engine boundary
//!
//! The engine performs the actual MPC computation. Every party talks to its
//! own engine node; nodes rendezvous on the session id carried by the
//! [`SessionConfig`]. This layer never inspects key material.

use crate::{KeyId, PartialSignature, PresignatureId, Result, SessionConfig};

pub use ::async_trait::async_trait;

/// Operations of one player's engine node
#[async_trait]
pub trait SigningEngine: Send + Sync {
    /// Join a key generation session; returns the new key's id once every
    /// player has joined and the round completed.
    async fn generate_key(&self, config: &SessionConfig) -> Result<KeyId>;

    /// Join a key copy session. Players that do not hold `existing_key_id`
    /// pass an empty string. The copy has the same public key.
    async fn copy_key(&self, config: &SessionConfig, existing_key_id: &str) -> Result<KeyId>;

    /// Join a presignature generation session for `key_id`
    async fn generate_presignatures(
        &self,
        config: &SessionConfig,
        key_id: &str,
        count: u64,
    ) -> Result<Vec<PresignatureId>>;

    /// Non-interactive partial signature over `message_hash`, consuming the
    /// presignature on this node
    async fn sign_with_presignature(
        &self,
        key_id: &str,
        presignature_id: &str,
        message_hash: &[u8],
    ) -> Result<PartialSignature>;

    /// Public key of `key_id`
    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>>;
}

/// In-memory engine cluster for tests and local deployments
pub mod memory;
pub mod schnorr;
pub mod wire;

pub use memory::{MemoryEngine, MemoryEngineNode};
pub use schnorr::{finalize_signature, verify_signature};
