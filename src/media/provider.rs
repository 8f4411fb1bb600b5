use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use super::capture::{AudioBlock, CaptureError, CaptureRequest};
use crate::video::VideoFrame;

/// Live streams returned by a provider. `stop` releases the underlying
/// hardware (and turns the capture indicator off).
pub struct CaptureStreams {
    pub audio: mpsc::Receiver<AudioBlock>,
    pub video: watch::Receiver<Option<VideoFrame>>,
    pub stop: Box<dyn FnOnce() + Send>,
}

/// Capability interface for device access, so sessions can run against real
/// hardware or a deterministic fake.
#[async_trait::async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn acquire(&self, request: &CaptureRequest) -> Result<CaptureStreams, CaptureError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Default provider: microphone via cpal.
///
/// The video side of the handle stays empty (`None`), which the frame sampler
/// treats as a not-yet-ready source; a camera-backed provider plugs in the
/// same way by filling the watch channel.
pub struct MicrophoneProvider;

impl MicrophoneProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MicrophoneProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureProvider for MicrophoneProvider {
    async fn acquire(&self, request: &CaptureRequest) -> Result<CaptureStreams, CaptureError> {
        let sample_rate = request.audio.sample_rate;
        let block_size = request.audio.block_size;

        debug!(
            "requesting microphone: {}Hz mono, {}-sample blocks (echo cancel: {}, noise suppress: {})",
            sample_rate,
            block_size,
            request.audio.echo_cancellation,
            request.audio.noise_suppression
        );

        let (audio_tx, audio_rx) = mpsc::channel::<AudioBlock>(64);
        let (video_tx, video_rx) = watch::channel::<Option<VideoFrame>>(None);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), CaptureError>>();

        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_flag = Arc::clone(&stop_flag);

        // cpal streams are not Send, so the stream lives on its own thread
        // for the whole capture.
        std::thread::spawn(move || {
            let host = cpal::default_host();

            let device = match host.default_input_device() {
                Some(device) => device,
                None => {
                    let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(
                        "no default input device".to_string(),
                    )));
                    return;
                }
            };

            let config = cpal::StreamConfig {
                channels: 1,
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };

            let mut block: Vec<f32> = Vec::with_capacity(block_size);

            let stream = device.build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        block.push(sample);
                        if block.len() == block_size {
                            let samples = std::mem::replace(
                                &mut block,
                                Vec::with_capacity(block_size),
                            );
                            // try_send to stay non-blocking in the audio callback
                            let _ = audio_tx.try_send(AudioBlock {
                                samples,
                                sample_rate,
                            });
                        }
                    }
                },
                |err: cpal::StreamError| {
                    error!("microphone stream error: {}", err);
                },
                None,
            );

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(map_build_error(e)));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(format!(
                    "failed to start input stream: {}",
                    e
                ))));
                return;
            }

            let _ = ready_tx.send(Ok(()));

            while !thread_flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }

            // Dropping the stream releases the device.
            drop(stream);
            drop(video_tx);
            info!("microphone released");
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(CaptureError::DeviceUnavailable(
                    "capture thread exited before the stream opened".to_string(),
                ))
            }
        }

        let stop = Box::new(move || {
            stop_flag.store(true, Ordering::SeqCst);
        });

        Ok(CaptureStreams {
            audio: audio_rx,
            video: video_rx,
            stop,
        })
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

/// Hosts report a refused device grant as a backend error with no dedicated
/// variant, so classify by message.
fn map_build_error(e: cpal::BuildStreamError) -> CaptureError {
    let text = e.to_string();
    let lowered = text.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("access") {
        CaptureError::PermissionDenied(text)
    } else {
        CaptureError::DeviceUnavailable(text)
    }
}
