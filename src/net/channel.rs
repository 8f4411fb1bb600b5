use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, ServerMessage};

/// Lifecycle of the logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint, e.g. "ws://localhost:8000/ws"
    pub url: String,
    /// Fixed delay between a close event and the next connect attempt
    pub reconnect_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

type Sink = Box<dyn Fn(String) + Send + Sync>;

/// Single-slot inbound callbacks; last registration wins
#[derive(Default)]
struct Sinks {
    open: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    status: Mutex<Option<Sink>>,
    audio: Mutex<Option<Sink>>,
    text: Mutex<Option<Sink>>,
    error: Mutex<Option<Sink>>,
}

/// One logical, auto-recovering WebSocket connection to the conversation
/// server.
///
/// Outbound audio/image messages are silently dropped (not queued) unless the
/// connection is currently open. Every close event, whatever its cause,
/// schedules exactly one reconnect attempt after the configured fixed delay,
/// indefinitely, until `disconnect()` is called.
pub struct TransportChannel {
    config: ChannelConfig,
    state: Arc<Mutex<ChannelState>>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    sinks: Arc<Sinks>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    connect_attempts: Arc<AtomicUsize>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl TransportChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ChannelState::Idle)),
            outbound: Arc::new(Mutex::new(None)),
            sinks: Arc::new(Sinks::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            connect_attempts: Arc::new(AtomicUsize::new(0)),
            driver: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock().unwrap()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Total connect attempts made so far (initial connects and reconnects)
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Register the connection-open callback. Last registration wins.
    pub fn set_on_open<F: Fn() + Send + Sync + 'static>(&self, f: F) {
        *self.sinks.open.lock().unwrap() = Some(Box::new(f));
    }

    /// Register the server-greeting sink. Last registration wins.
    pub fn set_on_status<F: Fn(String) + Send + Sync + 'static>(&self, f: F) {
        *self.sinks.status.lock().unwrap() = Some(Box::new(f));
    }

    /// Register the audio-chunk sink (receives the base64 payload).
    pub fn set_on_audio<F: Fn(String) + Send + Sync + 'static>(&self, f: F) {
        *self.sinks.audio.lock().unwrap() = Some(Box::new(f));
    }

    /// Register the text-fragment sink.
    pub fn set_on_text<F: Fn(String) + Send + Sync + 'static>(&self, f: F) {
        *self.sinks.text.lock().unwrap() = Some(Box::new(f));
    }

    /// Register the error sink (server-reported and transport errors).
    pub fn set_on_error<F: Fn(String) + Send + Sync + 'static>(&self, f: F) {
        *self.sinks.error.lock().unwrap() = Some(Box::new(f));
    }

    /// Begin connecting. No-op if the channel is already open or a connection
    /// driver is already running (it reconnects on its own).
    pub fn connect(self: &Arc<Self>) {
        let mut driver = self.driver.lock().unwrap();
        if let Some(handle) = driver.as_ref() {
            if !handle.is_finished() {
                debug!("transport already connected or connecting");
                return;
            }
        }

        self.shutdown.store(false, Ordering::SeqCst);

        let channel = Arc::clone(self);
        *driver = Some(tokio::spawn(async move {
            channel.run().await;
        }));
    }

    /// Close the connection and cancel any pending reconnect. The channel can
    /// be connected again later.
    pub async fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        // Dropping the outbound sender ends the writer side of the live
        // connection, which makes the driver loop observe the shutdown flag.
        self.outbound.lock().unwrap().take();
        self.wake.notify_waiters();

        let handle = self.driver.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("transport driver panicked: {}", e);
                }
            }
        }

        *self.state.lock().unwrap() = ChannelState::Idle;
        info!("transport disconnected");
    }

    /// Send one audio chunk (already base64-encoded PCM16). Dropped silently
    /// unless the connection is open.
    pub fn send_audio(&self, data: String) {
        self.send_message(ClientMessage::Audio { data });
    }

    /// Send one JPEG frame (already base64-encoded). Dropped silently unless
    /// the connection is open.
    pub fn send_image(&self, data: String) {
        self.send_message(ClientMessage::Image { data });
    }

    fn send_message(&self, message: ClientMessage) {
        if self.state() != ChannelState::Open {
            debug!("transport not open, dropping outbound message");
            return;
        }

        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize outbound message: {}", e);
                return;
            }
        };

        let outbound = self.outbound.lock().unwrap();
        if let Some(tx) = outbound.as_ref() {
            if tx.send(Message::Text(json)).is_err() {
                debug!("outbound writer gone, dropping message");
            }
        }
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.lock().unwrap() = state;
    }

    /// Connection driver: connect, pump messages until close, then wait the
    /// fixed delay and try again. Runs until `disconnect()`.
    async fn run(&self) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            self.set_state(ChannelState::Connecting);
            self.connect_attempts.fetch_add(1, Ordering::SeqCst);
            info!("connecting to {}", self.config.url);

            match connect_async(self.config.url.as_str()).await {
                Ok((ws, _response)) => {
                    // disconnect() may have fired while the handshake was in
                    // flight; dropping the stream closes the socket.
                    if self.shutdown.load(Ordering::SeqCst) {
                        drop(ws);
                        break;
                    }

                    info!("connected to server");
                    self.set_state(ChannelState::Open);
                    if let Some(f) = self.sinks.open.lock().unwrap().as_ref() {
                        f();
                    }

                    self.pump(ws).await;

                    self.outbound.lock().unwrap().take();
                    self.set_state(ChannelState::Closed);
                    info!("connection closed");
                }
                Err(e) => {
                    self.set_state(ChannelState::Closed);
                    warn!("failed to connect: {}", e);
                    if let Some(f) = self.sinks.error.lock().unwrap().as_ref() {
                        f(format!("failed to connect: {}", e));
                    }
                }
            }

            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            // Fixed-delay reconnect, no backoff and no attempt cap.
            debug!(
                "reconnecting in {:.1}s",
                self.config.reconnect_delay.as_secs_f64()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = self.wake.notified() => {}
            }
        }
    }

    /// Pump one live connection until it closes or `disconnect()` is called.
    async fn pump(
        &self,
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) {
        let (mut writer, mut reader) = ws.split();

        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.outbound.lock().unwrap() = Some(tx);

        // disconnect() sets the flag before taking the sender, so storing the
        // sender and then checking the flag closes the race between the two.
        if self.shutdown.load(Ordering::SeqCst) {
            self.outbound.lock().unwrap().take();
            return;
        }

        loop {
            tokio::select! {
                outgoing = rx.recv() => {
                    match outgoing {
                        Some(msg) => {
                            if let Err(e) = writer.send(msg).await {
                                warn!("failed to send message: {}", e);
                                break;
                            }
                        }
                        // Sender dropped by disconnect()
                        None => break,
                    }
                }
                incoming = reader.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                        Some(Err(e)) => {
                            warn!("transport error: {}", e);
                            if let Some(f) = self.sinks.error.lock().unwrap().as_ref() {
                                f(format!("transport error: {}", e));
                            }
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Parse one inbound frame and route it to the matching sink. Malformed
    /// frames are logged and ignored, never fatal to the connection.
    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Connected { message }) => {
                info!("server: {}", message);
                if let Some(f) = self.sinks.status.lock().unwrap().as_ref() {
                    f(message);
                }
            }
            Ok(ServerMessage::AudioDelta { data }) => {
                if let Some(f) = self.sinks.audio.lock().unwrap().as_ref() {
                    f(data);
                }
            }
            Ok(ServerMessage::TextDelta { data }) => {
                if let Some(f) = self.sinks.text.lock().unwrap().as_ref() {
                    f(data);
                }
            }
            Ok(ServerMessage::Error { message }) => {
                error!("server error: {}", message);
                if let Some(f) = self.sinks.error.lock().unwrap().as_ref() {
                    f(message);
                }
            }
            Ok(ServerMessage::Unknown) => {
                debug!("ignoring message with unknown type");
            }
            Err(e) => {
                warn!("ignoring malformed server message: {}", e);
            }
        }
    }
}
