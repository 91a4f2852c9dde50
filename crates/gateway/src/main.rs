//! TSM Gateway Service

use anyhow::Result;
use clap::Parser;
use gateway::{build_router, GatewayConfig};
use session_store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

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

    let config = GatewayConfig::parse();

    let store = SessionStore::new(config.session_ttl_secs);
    store.spawn_cleanup(Duration::from_secs(60));

    let dispatcher = config.dispatcher(store)?;
    info!(
        listen = %config.listen,
        player1 = %config.player1_url,
        player2 = %config.player2_url,
        signer = %config.signer_url(),
        digests = config.node1_public_key.is_some(),
        "Starting gateway"
    );

    let app = build_router(Arc::new(dispatcher));

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!(address = %config.listen, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
