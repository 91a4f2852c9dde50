//! Gateway configuration

use crate::dispatch::{Dispatcher, Peer};
use clap::Parser;
use session_store::SessionStore;
use std::time::Duration;
use tsm_core::session::FixedNodeKeys;
use tsm_core::types::SIGNER_PLAYER;
use tsm_core::{Error, Result, DEFAULT_CURVE};

/// Gateway CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "gateway")]
#[command(about = "TSM gateway for the mobile participant")]
#[command(version)]
pub struct GatewayConfig {
    /// Listen address
    #[arg(short, long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: String,

    /// Node controller of player 1
    #[arg(long, env = "PLAYER1_URL")]
    pub player1_url: String,

    /// Node controller of player 2
    #[arg(long, env = "PLAYER2_URL")]
    pub player2_url: String,

    /// Node controller that produces partial signatures (defaults to player 1)
    #[arg(long, env = "SIGNER_URL")]
    pub signer_url: Option<String>,

    /// Player 1's public key (base64); with NODE2_PUBLIC_KEY enables config digests
    #[arg(long, env = "NODE1_PUBLIC_KEY")]
    pub node1_public_key: Option<String>,

    /// Player 2's public key (base64)
    #[arg(long, env = "NODE2_PUBLIC_KEY")]
    pub node2_public_key: Option<String>,

    /// Upper bound on one dispatch, in seconds
    #[arg(long, env = "DISPATCH_TIMEOUT_SECS", default_value = "10")]
    pub dispatch_timeout_secs: u64,

    /// How long a node may take to report its engine join outcome, in seconds
    #[arg(long, env = "JOIN_TIMEOUT_SECS", default_value = "330")]
    pub join_timeout_secs: u64,

    /// How long session records are kept, in seconds
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "3600")]
    pub session_ttl_secs: i64,

    /// Curve name the nodes pass to their engines
    #[arg(long, env = "CURVE", default_value = DEFAULT_CURVE)]
    pub curve: String,
}

impl GatewayConfig {
    /// Keys of both fixed nodes, if configured
    pub fn fixed_keys(&self) -> Result<Option<FixedNodeKeys>> {
        match (&self.node1_public_key, &self.node2_public_key) {
            (Some(node1), Some(node2)) => Ok(Some(FixedNodeKeys::from_base64(node1, node2)?)),
            (None, None) => Ok(None),
            _ => Err(Error::configuration(
                "NODE1_PUBLIC_KEY and NODE2_PUBLIC_KEY must be set together",
            )),
        }
    }

    pub fn signer_url(&self) -> &str {
        self.signer_url.as_deref().unwrap_or(&self.player1_url)
    }

    /// Check the configuration and build the dispatcher
    pub fn dispatcher(&self, store: SessionStore) -> Result<Dispatcher> {
        for (name, url) in [("PLAYER1_URL", &self.player1_url), ("PLAYER2_URL", &self.player2_url)] {
            if url.trim().is_empty() {
                return Err(Error::configuration(format!("{name} is not set")));
            }
        }
        if self.dispatch_timeout_secs == 0 {
            return Err(Error::configuration("DISPATCH_TIMEOUT_SECS must be positive"));
        }
        if self.join_timeout_secs == 0 {
            return Err(Error::configuration("JOIN_TIMEOUT_SECS must be positive"));
        }

        let peers = vec![Peer::new(1, &self.player1_url), Peer::new(2, &self.player2_url)];
        let mut dispatcher = Dispatcher::new(peers, Peer::new(SIGNER_PLAYER, self.signer_url()), store)
            .with_timeout(Duration::from_secs(self.dispatch_timeout_secs))
            .with_join_timeout(Duration::from_secs(self.join_timeout_secs))
            .with_curve(self.curve.clone());
        if let Some(keys) = self.fixed_keys()? {
            dispatcher = dispatcher.with_fixed_keys(keys);
        }
        Ok(dispatcher)
    }
}
