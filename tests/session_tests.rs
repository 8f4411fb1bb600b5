// End-to-end session tests: scripted capture provider, fake playback sink,
// and an in-process WebSocket server standing in for the conversation
// backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use omnivox::media::{AudioBlock, CaptureError, CaptureProvider, CaptureRequest, CaptureStreams};
use omnivox::{ChatSession, PlaybackSink, SessionConfig, VideoFrame};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Capture provider that plays a fixed script of audio blocks and holds one
/// static video frame.
struct ScriptedProvider {
    blocks: Vec<Vec<f32>>,
    sample_rate: u32,
    frame: Option<VideoFrame>,
    /// Delay before the first block, giving the channel time to open
    warmup: Duration,
}

#[async_trait::async_trait]
impl CaptureProvider for ScriptedProvider {
    async fn acquire(&self, _request: &CaptureRequest) -> Result<CaptureStreams, CaptureError> {
        let (audio_tx, audio_rx) = mpsc::channel(16);
        let (video_tx, video_rx) = watch::channel(self.frame.clone());

        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();

        let blocks = self.blocks.clone();
        let sample_rate = self.sample_rate;
        let warmup = self.warmup;

        tokio::spawn(async move {
            tokio::time::sleep(warmup).await;
            for samples in blocks {
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                let _ = audio_tx
                    .send(AudioBlock {
                        samples,
                        sample_rate,
                    })
                    .await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            // Keep the video side alive until the stream is stopped.
            while !flag.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            drop(video_tx);
        });

        Ok(CaptureStreams {
            audio: audio_rx,
            video: video_rx,
            stop: Box::new(move || stopped.store(true, Ordering::SeqCst)),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Provider that refuses access, for the failed-start path.
struct DeniedProvider;

#[async_trait::async_trait]
impl CaptureProvider for DeniedProvider {
    async fn acquire(&self, _request: &CaptureRequest) -> Result<CaptureStreams, CaptureError> {
        Err(CaptureError::PermissionDenied(
            "camera and microphone access denied".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "denied"
    }
}

/// Sink that only records; these tests don't inspect the timeline.
#[derive(Default)]
struct NullSink {
    scheduled: Mutex<usize>,
}

impl PlaybackSink for NullSink {
    fn now(&self) -> f64 {
        0.0
    }
    fn schedule(&self, _samples: Vec<f32>, _start: f64) {
        *self.scheduled.lock().unwrap() += 1;
    }
    fn stop_all(&self) {}
    fn pending(&self) -> bool {
        false
    }
}

/// Accepts connections forever, sends `script` on each accept, and records
/// every inbound JSON message.
async fn spawn_server(script: Vec<&'static str>) -> (String, Arc<Mutex<Vec<Value>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let inbound = Arc::new(Mutex::new(Vec::new()));
    let store = inbound.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let Ok(mut ws) = accept_async(stream).await else {
                continue;
            };
            for raw in &script {
                let _ = ws.send(Message::Text(raw.to_string())).await;
            }
            let store = store.clone();
            tokio::spawn(async move {
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        if let Ok(value) = serde_json::from_str::<Value>(&text) {
                            store.lock().unwrap().push(value);
                        }
                    }
                }
            });
        }
    });

    (url, inbound)
}

fn test_config(url: String, video: bool) -> SessionConfig {
    SessionConfig {
        server_url: url,
        video_enabled: video,
        frame_period: Duration::from_millis(50),
        reconnect_delay: Duration::from_millis(100),
        ..SessionConfig::default()
    }
}

async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..150 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_three_capture_blocks_become_three_audio_messages() {
    let (url, inbound) = spawn_server(vec![]).await;

    let provider = ScriptedProvider {
        blocks: vec![vec![0.25f32; 4096]; 3],
        sample_rate: 48_000,
        frame: None,
        warmup: Duration::from_millis(200),
    };

    let session = ChatSession::new(
        test_config(url, false),
        Box::new(provider),
        Arc::new(NullSink::default()),
    );

    session.start().await.unwrap();

    wait_for("three audio messages", || inbound.lock().unwrap().len() >= 3).await;

    {
        let inbound = inbound.lock().unwrap();
        for message in inbound.iter().take(3) {
            assert_eq!(message["type"], "audio");
            let pcm = STANDARD
                .decode(message["data"].as_str().unwrap())
                .unwrap();
            // 4096 native samples at ratio 3 -> 1365 PCM16 samples
            assert_eq!(pcm.len(), 1365 * 2);
        }
    }

    let stats = session.stop().await;
    assert!(stats.audio_chunks_sent >= 3);
    assert!(!stats.is_running);
}

#[tokio::test]
async fn test_text_deltas_accumulate_into_transcript() {
    let (url, _inbound) = spawn_server(vec![
        r#"{"type":"connected","message":"welcome"}"#,
        r#"{"type":"text_delta","data":"Hel"}"#,
        r#"{"type":"text_delta","data":"lo"}"#,
    ])
    .await;

    let provider = ScriptedProvider {
        blocks: vec![],
        sample_rate: 48_000,
        frame: None,
        warmup: Duration::from_millis(50),
    };

    let session = ChatSession::new(
        test_config(url, false),
        Box::new(provider),
        Arc::new(NullSink::default()),
    );

    session.start().await.unwrap();

    wait_for("transcript", || session.transcript() == "Hello").await;
    assert_eq!(session.server_greeting().as_deref(), Some("welcome"));
    assert!(session.last_error().is_none());

    session.stop().await;
    assert_eq!(session.transcript(), "");
}

#[tokio::test]
async fn test_inbound_audio_reaches_the_playback_sink() {
    let chunk = STANDARD.encode(vec![0u8; 2400 * 2]);
    let script: &'static str = Box::leak(
        format!(r#"{{"type":"audio_delta","data":"{}"}}"#, chunk).into_boxed_str(),
    );
    let (url, _inbound) = spawn_server(vec![script]).await;

    let provider = ScriptedProvider {
        blocks: vec![],
        sample_rate: 48_000,
        frame: None,
        warmup: Duration::from_millis(50),
    };

    let sink = Arc::new(NullSink::default());
    let session = ChatSession::new(test_config(url, false), Box::new(provider), sink.clone());

    session.start().await.unwrap();

    wait_for("scheduled chunk", || *sink.scheduled.lock().unwrap() == 1).await;

    session.stop().await;
}

#[tokio::test]
async fn test_stop_halts_frame_capture() {
    let (url, inbound) = spawn_server(vec![]).await;

    let provider = ScriptedProvider {
        blocks: vec![],
        sample_rate: 48_000,
        frame: Some(VideoFrame::new(4, 4, vec![128u8; 4 * 4 * 3])),
        warmup: Duration::from_millis(50),
    };

    let session = ChatSession::new(
        test_config(url, true),
        Box::new(provider),
        Arc::new(NullSink::default()),
    );

    session.start().await.unwrap();

    let image_count = {
        let inbound = inbound.clone();
        move || {
            inbound
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m["type"] == "image")
                .count()
        }
    };

    wait_for("frames flowing", || image_count() >= 2).await;

    session.stop().await;
    let at_stop = image_count();

    // Wait out several frame periods: no further frames may arrive.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(image_count(), at_stop);
}

#[tokio::test]
async fn test_capture_failure_aborts_start() {
    let (url, _inbound) = spawn_server(vec![]).await;

    let session = ChatSession::new(
        test_config(url, false),
        Box::new(DeniedProvider),
        Arc::new(NullSink::default()),
    );

    let result = session.start().await;
    assert!(result.is_err());
    assert!(!session.is_running());
    assert!(!session.is_connected());
    assert!(session
        .last_error()
        .unwrap()
        .contains("access denied"));
}

#[tokio::test]
async fn test_session_survives_server_reported_errors() {
    let (url, _inbound) = spawn_server(vec![
        r#"{"type":"error","message":"model overloaded"}"#,
        r#"{"type":"text_delta","data":"ok"}"#,
    ])
    .await;

    let provider = ScriptedProvider {
        blocks: vec![],
        sample_rate: 48_000,
        frame: None,
        warmup: Duration::from_millis(50),
    };

    let session = ChatSession::new(
        test_config(url, false),
        Box::new(provider),
        Arc::new(NullSink::default()),
    );

    session.start().await.unwrap();

    wait_for("text after error", || session.transcript() == "ok").await;
    assert_eq!(
        session.last_error().as_deref(),
        Some("model overloaded")
    );
    assert!(session.is_running());

    session.stop().await;
}
