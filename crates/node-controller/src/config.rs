//! Node controller configuration

use clap::Parser;
use std::time::Duration;
use tsm_core::session::{NodeKeys, SessionDeriver};
use tsm_core::{Error, Result, DEFAULT_CURVE};

/// Node controller CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "node-controller")]
#[command(about = "TSM co-signer node controller")]
#[command(version)]
pub struct NodeConfig {
    /// Which fixed player this node is ("1" or "2")
    #[arg(long, env = "PLAYER_INDEX")]
    pub player_index: String,

    /// URL of this node's signing engine
    #[arg(long, env = "NODE_URL")]
    pub node_url: String,

    /// API key for this node's signing engine
    #[arg(long, env = "NODE_API_KEY")]
    pub node_api_key: String,

    /// This node's public key (base64)
    #[arg(long, env = "NODE_PUBLIC_KEY")]
    pub node_public_key: String,

    /// The other fixed node's public key (base64)
    #[arg(long, env = "ANOTHER_NODE_PUBLIC_KEY")]
    pub another_node_public_key: String,

    /// Listen address
    #[arg(short, long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Upper bound on one engine call, in seconds
    #[arg(long, env = "ENGINE_TIMEOUT_SECS", default_value = "300")]
    pub engine_timeout_secs: u64,

    /// How long session records are kept, in seconds
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "3600")]
    pub session_ttl_secs: i64,

    /// Curve name passed to the signing engine
    #[arg(long, env = "CURVE", default_value = DEFAULT_CURVE)]
    pub curve: String,
}

impl NodeConfig {
    /// Check the configuration and build the session deriver from it
    pub fn deriver(&self) -> Result<SessionDeriver> {
        if self.node_url.trim().is_empty() {
            return Err(Error::configuration("NODE_URL is not set"));
        }
        if self.node_api_key.trim().is_empty() {
            return Err(Error::configuration("NODE_API_KEY is not set"));
        }
        if self.engine_timeout_secs == 0 {
            return Err(Error::configuration("ENGINE_TIMEOUT_SECS must be positive"));
        }

        let keys = NodeKeys::from_base64(
            &self.player_index,
            &self.node_public_key,
            &self.another_node_public_key,
        )?;
        Ok(SessionDeriver::new(keys).with_curve(self.curve.clone()))
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }
}
