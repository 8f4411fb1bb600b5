use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Whether the session is currently running
    pub is_running: bool,

    /// Whether the server channel is currently open
    pub is_connected: bool,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Number of audio chunks sent to the server
    pub audio_chunks_sent: usize,

    /// Number of still frames sent to the server
    pub frames_sent: usize,

    /// Length of the accumulated transcript, in characters
    pub transcript_chars: usize,
}
