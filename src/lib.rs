pub mod audio;
pub mod config;
pub mod media;
pub mod net;
pub mod session;
pub mod video;

pub use audio::{AudioDownsampler, DeviceSink, PlaybackScheduler, PlaybackSink};
pub use config::Config;
pub use media::{
    AudioBlock, CaptureError, CaptureProvider, CaptureRequest, CaptureStreams, MediaCapture,
    MediaHandle, MicrophoneProvider, PreviewSink,
};
pub use net::{ChannelConfig, ChannelState, ClientMessage, ServerMessage, TransportChannel};
pub use session::{ChatSession, SessionConfig, SessionStats};
pub use video::{FrameSampler, VideoFrame};
