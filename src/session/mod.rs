//! Chat session management
//!
//! This module provides the `ChatSession` abstraction that wires the pipeline
//! together:
//! - media acquisition (microphone + camera)
//! - outbound audio downsampling and frame sampling
//! - the WebSocket channel to the conversation server
//! - inbound playback scheduling and transcript accumulation

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::ChatSession;
pub use stats::SessionStats;
