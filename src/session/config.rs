use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// WebSocket endpoint of the conversation server
    pub server_url: String,

    /// Native capture rate in Hz (what the microphone delivers)
    pub native_sample_rate: u32,

    /// Samples per capture block handed to the downsampler
    pub block_size: usize,

    /// Outbound transport rate in Hz (must divide the native rate evenly)
    pub transport_sample_rate: u32,

    /// Rate of the synthesized speech the server sends back, in Hz
    pub playback_sample_rate: u32,

    /// Whether to capture and stream camera frames
    pub video_enabled: bool,

    /// Period between outbound still frames
    pub frame_period: Duration,

    /// JPEG quality for outbound frames (0-100)
    pub jpeg_quality: u8,

    /// Fixed delay between transport close and reconnect
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("chat-{}", uuid::Uuid::new_v4()),
            server_url: "ws://localhost:8000/ws".to_string(),
            native_sample_rate: 48_000,
            block_size: 4096,
            transport_sample_rate: 16_000, // what the server expects
            playback_sample_rate: 24_000,  // what the server sends back
            video_enabled: true,
            frame_period: Duration::from_millis(500),
            jpeg_quality: 80,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}
