//! Gapless playback of the inbound speech stream.
//!
//! Chunks arrive as base64 PCM16 at 24kHz and are scheduled back-to-back on a
//! playback timeline: each chunk starts at max(clock now, cursor) and the
//! cursor advances by the chunk's duration. The clock and the actual audio
//! output sit behind `PlaybackSink` so tests can drive them deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("PCM16 payload has a trailing half sample ({0} bytes)")]
    TruncatedSample(usize),
}

/// Decode little-endian PCM16 bytes to float samples in [-1, 1].
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::TruncatedSample(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Playback output device plus its clock, Web-Audio style: `now()` advances
/// monotonically while the device runs, and buffers are started at absolute
/// clock positions.
pub trait PlaybackSink: Send + Sync {
    /// Current playback clock position in seconds
    fn now(&self) -> f64;
    /// Start playing `samples` at `start` seconds on the playback clock
    fn schedule(&self, samples: Vec<f32>, start: f64);
    /// Halt and discard everything scheduled or in flight
    fn stop_all(&self);
    /// Whether scheduled audio has not finished playing yet
    fn pending(&self) -> bool;
}

/// Timeline scheduler for the inbound audio stream.
pub struct PlaybackScheduler {
    sink: Arc<dyn PlaybackSink>,
    sample_rate: u32,
    cursor: Mutex<f64>,
}

impl PlaybackScheduler {
    pub fn new(sink: Arc<dyn PlaybackSink>, sample_rate: u32) -> Self {
        Self {
            sink,
            sample_rate,
            cursor: Mutex::new(0.0),
        }
    }

    /// Schedule one base64 chunk. A chunk that fails to decode is logged and
    /// skipped; later chunks are unaffected.
    pub fn enqueue_base64(&self, data: &str) {
        match STANDARD.decode(data) {
            Ok(bytes) => self.enqueue(&bytes),
            Err(e) => warn!("skipping audio chunk: {}", e),
        }
    }

    /// Schedule one raw PCM16 chunk back-to-back with the previous one.
    pub fn enqueue(&self, bytes: &[u8]) {
        let samples = match decode_pcm16(bytes) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("skipping audio chunk: {}", e);
                return;
            }
        };
        if samples.is_empty() {
            return;
        }

        let duration = samples.len() as f64 / self.sample_rate as f64;

        let mut cursor = self.cursor.lock().unwrap();
        let start = cursor.max(self.sink.now());
        self.sink.schedule(samples, start);
        *cursor = start + duration;
    }

    /// Halt all in-flight and scheduled playback and reset the timeline.
    /// Chunks arriving afterwards start fresh as if from silence.
    pub fn clear(&self) {
        let mut cursor = self.cursor.lock().unwrap();
        self.sink.stop_all();
        *cursor = 0.0;
    }

    pub fn is_playing(&self) -> bool {
        self.sink.pending()
    }
}

struct SinkShared {
    /// Frames waiting to be rendered, already positioned: index 0 plays next.
    queue: VecDeque<f32>,
    /// Frames emitted since the stream opened, silence included. This is the
    /// playback clock.
    emitted: u64,
}

/// Speaker output via cpal. The output callback drains a shared frame queue;
/// scheduling pads the queue with silence up to the requested start position,
/// so back-to-back schedules stay gapless.
pub struct DeviceSink {
    shared: Arc<Mutex<SinkShared>>,
    sample_rate: u32,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl DeviceSink {
    /// Open the default output device as mono f32 at `sample_rate`.
    pub fn open(sample_rate: u32) -> Result<Self> {
        let shared = Arc::new(Mutex::new(SinkShared {
            queue: VecDeque::new(),
            emitted: 0,
        }));

        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_flag = Arc::clone(&stop_flag);
        let thread_shared = Arc::clone(&shared);

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        // cpal streams are not Send; the stream lives on this thread.
        let thread = std::thread::spawn(move || {
            let host = cpal::default_host();

            let device = match host.default_output_device() {
                Some(device) => device,
                None => {
                    let _ = ready_tx.send(Err(anyhow!("no default output device")));
                    return;
                }
            };

            let config = cpal::StreamConfig {
                channels: 1,
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };

            let callback_shared = Arc::clone(&thread_shared);
            let stream = device.build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut shared = callback_shared.lock().unwrap();
                    for frame in data.iter_mut() {
                        *frame = shared.queue.pop_front().unwrap_or(0.0);
                    }
                    shared.emitted += data.len() as u64;
                },
                |err: cpal::StreamError| {
                    error!("playback stream error: {}", err);
                },
                None,
            );

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(anyhow!("failed to build output stream: {}", e)));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(anyhow!("failed to start output stream: {}", e)));
                return;
            }

            let _ = ready_tx.send(Ok(()));

            while !thread_flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }

            drop(stream);
            info!("playback device released");
        });

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow!("playback thread did not come up")),
        }

        Ok(Self {
            shared,
            sample_rate,
            stop_flag,
            thread: Some(thread),
        })
    }
}

impl PlaybackSink for DeviceSink {
    fn now(&self) -> f64 {
        let shared = self.shared.lock().unwrap();
        shared.emitted as f64 / self.sample_rate as f64
    }

    fn schedule(&self, samples: Vec<f32>, start: f64) {
        let mut shared = self.shared.lock().unwrap();
        let queue_end = (shared.emitted + shared.queue.len() as u64) as f64
            / self.sample_rate as f64;
        if start > queue_end {
            let pad = ((start - queue_end) * self.sample_rate as f64).round() as usize;
            shared.queue.extend(std::iter::repeat(0.0).take(pad));
        }
        shared.queue.extend(samples);
    }

    fn stop_all(&self) {
        self.shared.lock().unwrap().queue.clear();
    }

    fn pending(&self) -> bool {
        !self.shared.lock().unwrap().queue.is_empty()
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
