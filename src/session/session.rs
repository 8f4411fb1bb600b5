use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use tracing::{info, warn};

use super::config::SessionConfig;
use super::stats::SessionStats;
use crate::audio::{AudioDownsampler, PlaybackScheduler, PlaybackSink};
use crate::media::{
    AudioRequest, CaptureProvider, CaptureRequest, MediaCapture, PreviewSink, VideoRequest,
};
use crate::net::{ChannelConfig, TransportChannel};
use crate::video::FrameSampler;

/// One conversation with the server: owns the whole pipeline from microphone
/// and camera to speaker and transcript.
pub struct ChatSession {
    config: SessionConfig,

    /// Server channel; reconnects on its own while the session runs
    channel: Arc<TransportChannel>,

    /// Owns the live hardware stream
    capture: tokio::sync::Mutex<MediaCapture>,

    /// Outbound audio conversion loop, present while running
    downsampler: tokio::sync::Mutex<Option<AudioDownsampler>>,

    /// Periodic still-frame capture
    sampler: tokio::sync::Mutex<FrameSampler>,

    /// Schedules inbound speech for gapless playback
    playback: Arc<PlaybackScheduler>,

    /// Accumulated response text, reset per session
    transcript: Arc<Mutex<String>>,

    /// Most recent error surfaced to the user, cleared on the next
    /// successful connect
    last_error: Arc<Mutex<Option<String>>>,

    /// Greeting from the server's `connected` message
    greeting: Arc<Mutex<Option<String>>>,

    running: Arc<AtomicBool>,
    started_at: Mutex<chrono::DateTime<Utc>>,
    audio_chunks_sent: Arc<AtomicUsize>,
    frames_sent: Arc<AtomicUsize>,
}

impl ChatSession {
    /// Build a session around the given device capabilities. Nothing starts
    /// until `start()`.
    pub fn new(
        config: SessionConfig,
        provider: Box<dyn CaptureProvider>,
        sink: Arc<dyn PlaybackSink>,
    ) -> Self {
        let channel = Arc::new(TransportChannel::new(ChannelConfig {
            url: config.server_url.clone(),
            reconnect_delay: config.reconnect_delay,
        }));

        let request = CaptureRequest {
            audio: AudioRequest {
                sample_rate: config.native_sample_rate,
                block_size: config.block_size,
                ..AudioRequest::default()
            },
            video: config.video_enabled.then(VideoRequest::default),
        };

        let playback = Arc::new(PlaybackScheduler::new(sink, config.playback_sample_rate));
        let transcript = Arc::new(Mutex::new(String::new()));
        let last_error = Arc::new(Mutex::new(None));
        let greeting = Arc::new(Mutex::new(None));

        // Inbound routing: one single-slot sink per message kind.
        {
            let playback = Arc::clone(&playback);
            channel.set_on_audio(move |data| playback.enqueue_base64(&data));
        }
        {
            let transcript = Arc::clone(&transcript);
            channel.set_on_text(move |fragment| {
                transcript.lock().unwrap().push_str(&fragment);
            });
        }
        {
            let last_error = Arc::clone(&last_error);
            channel.set_on_error(move |message| {
                *last_error.lock().unwrap() = Some(message);
            });
        }
        {
            let greeting = Arc::clone(&greeting);
            channel.set_on_status(move |message| {
                *greeting.lock().unwrap() = Some(message);
            });
        }
        {
            // A successful connect clears any lingering transport error.
            let last_error = Arc::clone(&last_error);
            channel.set_on_open(move || {
                last_error.lock().unwrap().take();
            });
        }

        let sampler = FrameSampler::new(config.frame_period, config.jpeg_quality);

        Self {
            capture: tokio::sync::Mutex::new(MediaCapture::new(provider, request)),
            downsampler: tokio::sync::Mutex::new(None),
            sampler: tokio::sync::Mutex::new(sampler),
            channel,
            playback,
            transcript,
            last_error,
            greeting,
            running: Arc::new(AtomicBool::new(false)),
            started_at: Mutex::new(Utc::now()),
            audio_chunks_sent: Arc::new(AtomicUsize::new(0)),
            frames_sent: Arc::new(AtomicUsize::new(0)),
            config,
        }
    }

    /// Start the session: open the channel, acquire media, and begin
    /// streaming. A capture failure aborts the start and releases everything
    /// acquired so far; transport failures do not (the channel retries on its
    /// own).
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("session already started");
            return Ok(());
        }

        info!("starting chat session: {}", self.config.session_id);

        *self.started_at.lock().unwrap() = Utc::now();
        self.transcript.lock().unwrap().clear();
        self.last_error.lock().unwrap().take();
        self.audio_chunks_sent.store(0, Ordering::SeqCst);
        self.frames_sent.store(0, Ordering::SeqCst);

        self.channel.connect();

        let mut handle = {
            let mut capture = self.capture.lock().await;
            match capture.start().await {
                Ok(handle) => handle,
                Err(e) => {
                    *self.last_error.lock().unwrap() = Some(e.to_string());
                    self.channel.disconnect().await;
                    self.running.store(false, Ordering::SeqCst);
                    return Err(e).context("failed to acquire capture devices");
                }
            }
        };

        let blocks = match handle.take_audio() {
            Some(blocks) => blocks,
            None => {
                self.capture.lock().await.stop();
                self.channel.disconnect().await;
                self.running.store(false, Ordering::SeqCst);
                anyhow::bail!("capture provider returned no audio stream");
            }
        };

        let downsampler = {
            let channel = Arc::clone(&self.channel);
            let sent = Arc::clone(&self.audio_chunks_sent);
            let alive = Arc::clone(&self.running);
            AudioDownsampler::spawn(
                self.config.native_sample_rate,
                self.config.transport_sample_rate,
                blocks,
                move |chunk| {
                    if !alive.load(Ordering::SeqCst) {
                        return;
                    }
                    channel.send_audio(STANDARD.encode(chunk));
                    sent.fetch_add(1, Ordering::SeqCst);
                },
            )
        };

        let downsampler = match downsampler {
            Ok(downsampler) => downsampler,
            Err(e) => {
                self.capture.lock().await.stop();
                self.channel.disconnect().await;
                self.running.store(false, Ordering::SeqCst);
                return Err(e).context("invalid resampling configuration");
            }
        };
        *self.downsampler.lock().await = Some(downsampler);

        if self.config.video_enabled {
            let channel = Arc::clone(&self.channel);
            let sent = Arc::clone(&self.frames_sent);
            let alive = Arc::clone(&self.running);
            self.sampler.lock().await.start(handle.video(), move |payload| {
                if !alive.load(Ordering::SeqCst) {
                    return;
                }
                channel.send_image(payload);
                sent.fetch_add(1, Ordering::SeqCst);
            });
        }

        info!("chat session started");
        Ok(())
    }

    /// Stop the session, release all media and transport resources, and
    /// return the final statistics. The transcript resets with the session.
    pub async fn stop(&self) -> SessionStats {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("session not running");
            return self.stats();
        }

        info!("stopping chat session: {}", self.config.session_id);

        self.sampler.lock().await.stop().await;

        if let Some(mut downsampler) = self.downsampler.lock().await.take() {
            downsampler.stop().await;
        }

        self.capture.lock().await.stop();
        self.playback.clear();
        self.channel.disconnect().await;

        let stats = self.stats();

        self.transcript.lock().unwrap().clear();
        self.last_error.lock().unwrap().take();
        self.greeting.lock().unwrap().take();

        info!(
            "chat session stopped ({} audio chunks, {} frames sent)",
            stats.audio_chunks_sent, stats.frames_sent
        );

        stats
    }

    /// Accumulated response text so far this session.
    pub fn transcript(&self) -> String {
        self.transcript.lock().unwrap().clone()
    }

    /// Most recent surfaced error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Greeting from the server once it accepted the connection.
    pub fn server_greeting(&self) -> Option<String> {
        self.greeting.lock().unwrap().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    /// Whether inbound speech is still scheduled or playing.
    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Drop all scheduled and in-flight playback, e.g. when the user starts
    /// a new turn.
    pub fn clear_playback(&self) {
        self.playback.clear();
    }

    /// Attach a local preview sink for the self-view.
    pub async fn bind_preview(&self, sink: Box<dyn PreviewSink>) {
        self.capture.lock().await.bind(sink);
    }

    pub fn stats(&self) -> SessionStats {
        let started_at = *self.started_at.lock().unwrap();
        let duration = Utc::now().signed_duration_since(started_at);

        SessionStats {
            is_running: self.running.load(Ordering::SeqCst),
            is_connected: self.channel.is_open(),
            started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            audio_chunks_sent: self.audio_chunks_sent.load(Ordering::SeqCst),
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            transcript_chars: self.transcript.lock().unwrap().chars().count(),
        }
    }
}
