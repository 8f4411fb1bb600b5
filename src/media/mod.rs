//! Media acquisition
//!
//! `MediaCapture` owns the live audio+video handle for the session. The
//! actual device access is behind the `CaptureProvider` trait so hardware can
//! be swapped for deterministic fakes in tests.

pub mod capture;
pub mod provider;

pub use capture::{
    AudioBlock, AudioRequest, CaptureError, CaptureRequest, MediaCapture, MediaHandle,
    PreviewSink, VideoRequest,
};
pub use provider::{CaptureProvider, CaptureStreams, MicrophoneProvider};
