//! Mobile Party CLI
//!
//! Command-line interface for the dynamic participant:
//! - Key generation and key copy
//! - Presigning
//! - Signing with a presignature, finalized and verified locally

use anyhow::Result;
use clap::{Parser, Subcommand};
use engine_client::EngineClient;
use mobile_party::{GatewayClient, MobileParty};
use session_store::SessionStore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

/// Mobile Party - dynamic TSM participant
#[derive(Parser)]
#[command(name = "mobile-party")]
#[command(about = "Dynamic participant of the TSM co-signer deployment")]
#[command(version)]
struct Cli {
    /// Gateway URL
    #[arg(short, long, env = "GATEWAY_URL", default_value = "http://127.0.0.1:3000")]
    gateway: String,

    /// URL of this participant's signing engine node
    #[arg(short, long, env = "ENGINE_URL", default_value = "http://127.0.0.1:8090")]
    engine: String,

    /// API key for the signing engine node
    #[arg(long, env = "ENGINE_API_KEY")]
    api_key: String,

    /// This participant's public key (base64)
    #[arg(long, env = "MOBILE_PUBLIC_KEY")]
    public_key: String,

    /// Upper bound on one engine call, in seconds
    #[arg(long, env = "ENGINE_TIMEOUT_SECS", default_value = "300")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key with both nodes
    Keygen,

    /// Copy an existing key into a new key with the same public key
    Copy {
        /// Key to copy
        #[arg(short, long)]
        key_id: String,
    },

    /// Generate presignatures for a key
    Presign {
        #[arg(short, long)]
        key_id: String,

        /// Number of presignatures
        #[arg(short, long, default_value = "1")]
        count: u64,
    },

    /// Sign a message hash with a presignature
    Sign {
        #[arg(short, long)]
        key_id: String,

        #[arg(short, long)]
        presignature_id: String,

        /// Message to sign (hex encoded 32-byte hash)
        #[arg(short, long)]
        message: String,
    },

    /// Key generation, copy, presign and sign in one run
    Demo {
        /// Message to hash and sign
        #[arg(short, long, default_value = "hello from the mobile party")]
        message: String,
    },
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

    let cli = Cli::parse();

    let engine = EngineClient::new(&cli.engine, &cli.api_key)
        .with_timeout(Duration::from_secs(cli.timeout));
    let party = MobileParty::new(
        GatewayClient::new(&cli.gateway),
        Arc::new(engine),
        &cli.public_key,
        SessionStore::default(),
    )?;

    match cli.command {
        Commands::Keygen => {
            let key_id = party.generate_key().await?;
            println!("Key ID: {key_id}");
        }
        Commands::Copy { ref key_id } => {
            let copy_id = party.copy_key(key_id).await?;
            println!("Key ID: {copy_id}");
        }
        Commands::Presign { ref key_id, count } => {
            for id in party.presign(key_id, count).await? {
                println!("Presignature ID: {id}");
            }
        }
        Commands::Sign {
            ref key_id,
            ref presignature_id,
            ref message,
        } => {
            let message_hash: [u8; 32] = hex::decode(message)?
                .try_into()
                .map_err(|_| anyhow::anyhow!("Message must be 32 bytes"))?;
            run_sign(&party, key_id, presignature_id, &message_hash).await?;
        }
        Commands::Demo { ref message } => {
            run_demo(&party, message).await?;
        }
    }

    Ok(())
}

async fn run_sign(
    party: &MobileParty,
    key_id: &str,
    presignature_id: &str,
    message_hash: &[u8],
) -> Result<()> {
    let signature = party.sign(key_id, presignature_id, message_hash).await?;

    println!("Signature:");
    println!("  R: {}", hex::encode(&signature.r));
    println!("  s: {}", hex::encode(signature.s));

    Ok(())
}

async fn run_demo(party: &MobileParty, message: &str) -> Result<()> {
    let key_id = party.generate_key().await?;
    info!(key_id = %key_id, "Step 1/4: key generated");

    let copy_id = party.copy_key(&key_id).await?;
    info!(key_id = %copy_id, "Step 2/4: key copied");

    let presignatures = party.presign(&copy_id, 1).await?;
    info!(count = presignatures.len(), "Step 3/4: presignatures generated");
    let presignature_id = presignatures
        .first()
        .ok_or_else(|| anyhow::anyhow!("engine returned no presignatures"))?;

    let message_hash = Sha256::digest(message.as_bytes());
    info!(message_hash = %hex::encode(message_hash), "Step 4/4: signing");
    run_sign(party, &copy_id, presignature_id, &message_hash).await?;

    println!("Key ID: {key_id}");
    println!("Copied Key ID: {copy_id}");

    Ok(())
}
