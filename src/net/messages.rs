use serde::{Deserialize, Serialize};

/// Outbound message sent to the conversation server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Base64-encoded PCM16 audio at the transport rate (16kHz mono)
    Audio { data: String },
    /// Base64-encoded JPEG still frame
    Image { data: String },
}

/// Inbound message received from the conversation server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting sent once the server has accepted the connection
    Connected { message: String },
    /// Base64-encoded PCM16 audio at the playback rate (24kHz mono)
    AudioDelta { data: String },
    /// A fragment of streamed response text
    TextDelta { data: String },
    /// Server-reported failure; the session keeps running
    Error { message: String },
    /// Message types this client does not understand are ignored
    #[serde(other)]
    Unknown,
}
