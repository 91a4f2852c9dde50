//! # Gateway
//!
//! Public entry point for the mobile participant. Every session-starting
//! call mints a fresh session id, fans the join requests out to the node
//! controllers and answers immediately so the caller can join the same
//! session on its own engine.

pub mod config;
pub mod dispatch;
pub mod handlers;

pub use config::GatewayConfig;
pub use dispatch::{Dispatch, DispatchOutcome, Dispatcher, Peer};
pub use handlers::build_router;
