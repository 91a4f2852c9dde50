//! # Node Controller
//!
//! Runs next to one fixed co-signer's signing engine. It re-derives every
//! session configuration from its own static keys and the caller's public
//! key, joins the engine round in the background and hands out partial
//! signatures when it is the designated signer.

pub mod config;
pub mod handlers;
pub mod service;

pub use config::NodeConfig;
pub use handlers::build_router;
pub use service::NodeService;
