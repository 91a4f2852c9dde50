//! Signing Engine Service
//!
//! Runs every player's engine node in one process for local deployments.

use anyhow::{anyhow, Result};
use clap::Parser;
use engine_svc::{build_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tsm_core::engine::MemoryEngine;
use tsm_core::PlayerIndex;

/// Signing engine service CLI arguments
#[derive(Parser, Debug)]
#[command(name = "engine-svc")]
#[command(about = "In-memory signing engine cluster for TSM co-signer nodes")]
struct Args {
    /// Listen address
    #[arg(short, long, env = "LISTEN", default_value = "0.0.0.0:8090")]
    listen: String,

    /// API key per player, as `<player>=<api key>`
    #[arg(long = "player-key", env = "PLAYER_KEYS", value_delimiter = ',', value_parser = parse_player_key)]
    player_keys: Vec<(PlayerIndex, String)>,

    /// Seconds a join waits for the remaining players
    #[arg(long, env = "JOIN_TIMEOUT_SECS", default_value = "300")]
    join_timeout: u64,
}

fn parse_player_key(s: &str) -> std::result::Result<(PlayerIndex, String), String> {
    let (player, api_key) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <player>=<api key>, got {s:?}"))?;
    let player = player
        .trim()
        .parse::<PlayerIndex>()
        .map_err(|e| format!("invalid player index {player:?}: {e}"))?;
    if api_key.is_empty() {
        return Err(format!("empty API key for player {player}"));
    }
    Ok((player, api_key.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    if args.player_keys.is_empty() {
        return Err(anyhow!("at least one --player-key is required"));
    }

    info!(
        listen = %args.listen,
        players = ?args.player_keys.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
        join_timeout = args.join_timeout,
        "Starting signing engine service"
    );

    let engine = MemoryEngine::with_timeout(Duration::from_secs(args.join_timeout));
    let state = args
        .player_keys
        .into_iter()
        .fold(AppState::new(engine), |state, (player, api_key)| {
            state.with_player(api_key, player)
        });

    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!(address = %args.listen, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
