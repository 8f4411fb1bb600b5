use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use omnivox::{ChatSession, Config, DeviceSink, MicrophoneProvider};
use tracing::info;

/// Real-time voice/video chat client for a conversational AI server
#[derive(Debug, Parser)]
#[command(name = "omnivox", version)]
struct Args {
    /// Path to a config file (defaults apply without one)
    #[arg(long)]
    config: Option<String>,

    /// WebSocket endpoint, overrides the config file
    #[arg(long)]
    url: Option<String>,

    /// Run audio-only, without camera frames
    #[arg(long)]
    no_video: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let mut session_config = config.session_config();
    if let Some(url) = args.url {
        session_config.server_url = url;
    }
    if args.no_video {
        session_config.video_enabled = false;
    }

    info!("omnivox v{}", env!("CARGO_PKG_VERSION"));
    info!("server: {}", session_config.server_url);

    let sink = Arc::new(DeviceSink::open(session_config.playback_sample_rate)?);
    let session = ChatSession::new(
        session_config,
        Box::new(MicrophoneProvider::new()),
        sink,
    );

    session.start().await?;
    info!("session running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;

    let stats = session.stop().await;
    info!(
        "session ended after {:.1}s: {} audio chunks and {} frames sent",
        stats.duration_secs, stats.audio_chunks_sent, stats.frames_sent
    );

    Ok(())
}
