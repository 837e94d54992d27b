//! Standalone signaling relay for mesh rooms.
//!
//! Run with:
//!   cargo run --bin mesh-relay -- --bind 0.0.0.0:8000

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mesh_room::config::{DEFAULT_MAX_USERS, DEFAULT_RELAY_BIND};
use mesh_room::relay::RelayServer;

/// Signaling relay for full-mesh WebRTC rooms
#[derive(Parser, Debug)]
#[command(name = "mesh-relay")]
#[command(about = "Signaling relay for full-mesh WebRTC rooms")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "MESH_RELAY_BIND", default_value = DEFAULT_RELAY_BIND)]
    bind: String,

    /// Participants admitted per room
    #[arg(long, default_value_t = DEFAULT_MAX_USERS)]
    max_users: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .compact()
        .init();

    let server = RelayServer::new(args.max_users);
    tokio::select! {
        result = server.run(&args.bind) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }
    Ok(())
}
