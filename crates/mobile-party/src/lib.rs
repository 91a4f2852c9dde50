//! # Mobile Party
//!
//! Drives the dynamic participant's side of key generation, key copy,
//! presigning and signing against a gateway and the participant's own
//! signing engine node.

pub mod gateway_client;
pub mod party;

pub use gateway_client::GatewayClient;
pub use party::MobileParty;
