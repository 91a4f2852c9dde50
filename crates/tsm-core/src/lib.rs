//! # TSM Core
//!
//! Shared building blocks for the TSM co-signer deployment: one dynamic
//! (mobile) participant and two fixed co-signer nodes running a threshold
//! Schnorr protocol inside an external signing engine.
//!
//! This crate provides:
//! - Session configuration derivation (participant indices and the
//!   index → public key mapping every party must agree on)
//! - The JSON wire types exchanged by the gateway, the node controllers and
//!   the mobile party
//! - The [`engine::SigningEngine`] boundary plus an in-memory engine cluster
//!
//! ## Example
//!
//! ```rust,ignore
//! use tsm_core::{session::{NodeKeys, SessionDeriver}, SessionId};
//!
//! let deriver = SessionDeriver::new(NodeKeys::from_base64("1", node_pk, peer_pk)?);
//! let config = deriver.generate_key_session(SessionId::generate(), mobile_pk)?;
//! let key_id = engine.generate_key(&config).await?;
//! ```

pub mod api;
pub mod engine;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod session;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use session::SessionConfig;
pub use types::{
    KeyId, NodeRole, OperationKind, PartialSignature, PlayerIndex, PresignatureId, SessionId,
    Signature,
};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Security threshold of every key: any two of the three players can sign
pub const DEFAULT_THRESHOLD: usize = 1;

/// Curve used by the bundled engine
pub const DEFAULT_CURVE: &str = "secp256k1";
