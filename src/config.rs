use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::session::SessionConfig;

/// File-based configuration for the client binary
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket endpoint of the conversation server
    pub url: String,
    /// Seconds between a dropped connection and the reconnect attempt
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Native microphone rate in Hz
    pub sample_rate: u32,
    /// Samples per capture block
    pub block_size: usize,
    /// Outbound transport rate in Hz
    pub transport_sample_rate: u32,
    /// Whether to stream camera frames
    pub video: bool,
    /// Milliseconds between outbound still frames
    pub frame_period_ms: u64,
    /// JPEG quality for outbound frames (0-100)
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Rate of the synthesized speech stream in Hz
    pub sample_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            capture: CaptureConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            reconnect_delay_secs: 5,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 4096,
            transport_sample_rate: 16_000,
            video: true,
            frame_period_ms: 500,
            jpeg_quality: 80,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Flatten into the per-session configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            server_url: self.server.url.clone(),
            native_sample_rate: self.capture.sample_rate,
            block_size: self.capture.block_size,
            transport_sample_rate: self.capture.transport_sample_rate,
            playback_sample_rate: self.playback.sample_rate,
            video_enabled: self.capture.video,
            frame_period: Duration::from_millis(self.capture.frame_period_ms),
            jpeg_quality: self.capture.jpeg_quality,
            reconnect_delay: Duration::from_secs(self.server.reconnect_delay_secs),
            ..SessionConfig::default()
        }
    }
}
