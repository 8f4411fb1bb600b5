use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::frame::VideoFrame;

/// Periodically encodes the most recent video frame as a base64 JPEG and
/// hands it to the frame callback.
///
/// Ticks where the source has no frame yet are skipped silently; the next
/// tick simply tries again.
pub struct FrameSampler {
    period: Duration,
    quality: u8,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FrameSampler {
    /// `quality` is JPEG quality 0-100 (the wire default is 80).
    pub fn new(period: Duration, quality: u8) -> Self {
        Self {
            period,
            quality,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Begin the capture timer. No-op if already running.
    pub fn start<F>(&mut self, video: watch::Receiver<Option<VideoFrame>>, on_frame: F)
    where
        F: Fn(String) + Send + 'static,
    {
        if self.task.is_some() {
            debug!("frame sampler already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        let alive = Arc::clone(&self.running);
        let period = self.period;
        let quality = self.quality;

        self.task = Some(tokio::spawn(async move {
            // First tick after one full period, matching a plain interval
            // timer.
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !alive.load(Ordering::SeqCst) {
                    break;
                }

                // Source not ready yet: skip this tick.
                let frame = match video.borrow().clone() {
                    Some(frame) => frame,
                    None => continue,
                };

                match frame.encode_jpeg_base64(quality) {
                    Ok(payload) => on_frame(payload),
                    Err(e) => warn!("dropping frame: {}", e),
                }
            }
            debug!("frame sampler loop finished");
        }));
    }

    /// Cancel the timer. Idempotent; no tick fires after this returns.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}
