//! Node Controller Service

use anyhow::Result;
use clap::Parser;
use engine_client::EngineClient;
use node_controller::{build_router, NodeConfig, NodeService};
use session_store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

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

    let config = NodeConfig::parse();
    let deriver = config.deriver()?;

    info!(
        listen = %config.listen,
        player = deriver.role().index(),
        engine = %config.node_url,
        curve = %config.curve,
        "Starting node controller"
    );

    let engine = EngineClient::new(&config.node_url, &config.node_api_key)
        .with_timeout(config.engine_timeout());
    if let Err(e) = engine.health().await {
        warn!(error = %e, "Signing engine is not reachable yet");
    }

    let store = SessionStore::new(config.session_ttl_secs);
    store.spawn_cleanup(Duration::from_secs(60));

    let service = Arc::new(NodeService::new(
        deriver,
        Arc::new(engine),
        store,
        config.engine_timeout(),
    ));
    let app = build_router(service);

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!(address = %config.listen, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
