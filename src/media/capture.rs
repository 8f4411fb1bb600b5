use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use super::provider::CaptureProvider;
use crate::video::VideoFrame;

/// One fixed-length block of mono float samples from the capture device
#[derive(Debug, Clone)]
pub struct AudioBlock {
    /// Samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Native capture rate in Hz
    pub sample_rate: u32,
}

/// Requested audio capture parameters
#[derive(Debug, Clone)]
pub struct AudioRequest {
    /// Native capture rate in Hz
    pub sample_rate: u32,
    /// Samples per delivered block
    pub block_size: usize,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for AudioRequest {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 4096, // ~85ms at 48kHz
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Requested video capture parameters
#[derive(Debug, Clone)]
pub struct VideoRequest {
    /// Ideal width in pixels
    pub width: u32,
    /// Ideal height in pixels
    pub height: u32,
}

impl Default for VideoRequest {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Combined capture request. `video: None` runs an audio-only session.
#[derive(Debug, Clone, Default)]
pub struct CaptureRequest {
    pub audio: AudioRequest,
    pub video: Option<VideoRequest>,
}

impl CaptureRequest {
    pub fn audio_only(audio: AudioRequest) -> Self {
        Self { audio, video: None }
    }
}

/// Why media acquisition failed. Both abort session start.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("device access denied: {0}")]
    PermissionDenied(String),
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Display sink for the local self-view. The display layer itself is out of
/// scope; this is only the attachment point.
pub trait PreviewSink: Send + Sync {
    fn attach(&self, video: watch::Receiver<Option<VideoFrame>>);
    fn detach(&self);
}

/// Taps onto the live hardware stream, handed out by `MediaCapture::start`.
///
/// The audio tap is single-consumer and taken once (by the downsampler); the
/// video tap can be cloned freely. Neither can stop the hardware; only
/// `MediaCapture::stop` releases it.
pub struct MediaHandle {
    audio: Option<mpsc::Receiver<AudioBlock>>,
    video: watch::Receiver<Option<VideoFrame>>,
}

impl MediaHandle {
    pub fn take_audio(&mut self) -> Option<mpsc::Receiver<AudioBlock>> {
        self.audio.take()
    }

    pub fn video(&self) -> watch::Receiver<Option<VideoFrame>> {
        self.video.clone()
    }
}

struct LiveCapture {
    video: watch::Receiver<Option<VideoFrame>>,
    stop: Option<Box<dyn FnOnce() + Send>>,
}

/// Owns the lifetime of the live capture stream.
pub struct MediaCapture {
    provider: Box<dyn CaptureProvider>,
    request: CaptureRequest,
    live: Option<LiveCapture>,
    preview: Option<Box<dyn PreviewSink>>,
}

impl MediaCapture {
    pub fn new(provider: Box<dyn CaptureProvider>, request: CaptureRequest) -> Self {
        Self {
            provider,
            request,
            live: None,
            preview: None,
        }
    }

    /// Acquire the combined audio+video stream. At most one handle is live at
    /// a time: starting while active releases the previous stream first.
    pub async fn start(&mut self) -> Result<MediaHandle, CaptureError> {
        if self.live.is_some() {
            warn!("capture already active, restarting");
            self.stop();
        }

        let streams = self.provider.acquire(&self.request).await?;

        self.live = Some(LiveCapture {
            video: streams.video.clone(),
            stop: Some(streams.stop),
        });

        if let Some(preview) = &self.preview {
            preview.attach(streams.video.clone());
        }

        info!("media capture started ({})", self.provider.name());

        Ok(MediaHandle {
            audio: Some(streams.audio),
            video: streams.video,
        })
    }

    /// Release every track of the current stream. No-op when idle.
    pub fn stop(&mut self) {
        if let Some(mut live) = self.live.take() {
            if let Some(stop) = live.stop.take() {
                stop();
            }
            if let Some(preview) = &self.preview {
                preview.detach();
            }
            info!("media capture stopped");
        }
    }

    /// Attach a local preview sink. If capture is already live the sink is
    /// attached immediately; a later `start()` re-attaches automatically.
    pub fn bind(&mut self, sink: Box<dyn PreviewSink>) {
        if let Some(live) = &self.live {
            sink.attach(live.video.clone());
        }
        self.preview = Some(sink);
    }

    pub fn is_active(&self) -> bool {
        self.live.is_some()
    }
}

impl Drop for MediaCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
