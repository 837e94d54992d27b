//! mesh-room - join a room and connect to every participant over WebRTC

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use mesh_room::config::{ClientConfig, DEFAULT_SIGNALING_URL, DEFAULT_STUN_SERVER};
use mesh_room::media::LocalMedia;
use mesh_room::transport::RemoteStream;
use mesh_room::webrtc::WebRtcConnector;
use mesh_room::{PeerId, Presenter, RoomSession, SignalingClient, SignalingMessage};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "mesh-room")]
#[command(about = "Join a room and hold a WebRTC connection to every other participant")]
#[command(version)]
struct Cli {
    /// Signaling relay URL
    #[arg(short, long, env = "MESH_SIGNALING_URL", default_value = DEFAULT_SIGNALING_URL)]
    server: String,

    /// Room to join
    #[arg(short, long, env = "MESH_ROOM")]
    room: String,

    /// STUN/TURN server URL (repeatable)
    #[arg(long = "ice-server", default_value = DEFAULT_STUN_SERVER)]
    ice_servers: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Stands in for a video grid: one log line per tile.
struct LogPresenter;

impl Presenter for LogPresenter {
    fn on_remote_stream(&self, peer: &PeerId, stream: &RemoteStream) {
        info!(peer = %peer, stream = %stream.stream_id, tracks = stream.tracks.len(), "Showing participant");
    }

    fn on_peer_removed(&self, peer: &PeerId) {
        info!(peer = %peer, "Removing participant");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .compact()
        .init();

    let config = ClientConfig::new(cli.server, cli.room).with_ice_servers(cli.ice_servers);
    run(config).await
}

async fn run(config: ClientConfig) -> Result<()> {
    if config.room.trim().is_empty() {
        bail!("Room cannot be empty");
    }

    let mut signaling = SignalingClient::connect(&config.signaling_url)
        .await
        .with_context(|| format!("Failed to connect to {}", config.signaling_url))?;

    let local_id = loop {
        match signaling.receive().await {
            Some(SignalingMessage::Welcome(id)) => break id,
            Some(other) => debug!(event = other.event_name(), "Ignoring message before welcome"),
            None => bail!("Signaling channel closed before an id was assigned"),
        }
    };
    info!(id = %local_id, room = %config.room, "Connected to signaling relay");

    let media = Arc::new(LocalMedia::new(local_id.as_str()));
    let connector = WebRtcConnector::new(config.rtc_ice_servers(), media)?;
    let mut session = RoomSession::new(
        config.room.clone(),
        local_id,
        connector,
        signaling.outbound(),
        LogPresenter,
    );

    signaling
        .send(SignalingMessage::JoinRoom(config.room.clone()))
        .await?;

    loop {
        tokio::select! {
            msg = signaling.receive() => match msg {
                Some(SignalingMessage::Full(room)) => {
                    error!(room = %room, "Room is full");
                    break;
                }
                Some(msg) => session.on_signal(msg),
                None => {
                    warn!("Signaling channel closed");
                    break;
                }
            },
            Some(input) = session.next_input() => session.handle(input),
            _ = tokio::signal::ctrl_c() => {
                info!("Leaving room");
                break;
            }
        }
    }

    session.close_all();
    if tokio::time::timeout(SHUTDOWN_GRACE, session.settle()).await.is_err() {
        warn!("Timed out closing peer connections");
    }
    Ok(())
}
