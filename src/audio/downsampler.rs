//! Outbound audio conversion: native-rate float blocks to 16kHz PCM16 chunks.
//!
//! Downsampling is plain point decimation: every R-th sample, no anti-alias
//! filter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{ensure, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::media::AudioBlock;

/// Keep every `ratio`-th sample, starting at index 0. A length-N input yields
/// exactly floor(N / ratio) output samples.
pub fn decimate(input: &[f32], ratio: usize) -> Vec<f32> {
    let out_len = input.len() / ratio;
    (0..out_len).map(|i| input[i * ratio]).collect()
}

/// Convert float samples in [-1, 1] to signed 16-bit PCM. Input is clamped
/// first; positive values scale by 32767 and negative by 32768, so -1.0 maps
/// to -32768 and 1.0 to 32767.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0).round() as i16
            } else {
                (s * 32767.0).round() as i16
            }
        })
        .collect()
}

/// Decimate one input block and encode it as little-endian PCM16 bytes.
pub fn encode_chunk(block: &[f32], ratio: usize) -> Vec<u8> {
    to_pcm16(&decimate(block, ratio))
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

/// Converts the live audio block stream into transport chunks, one chunk per
/// block, delivered synchronously to the chunk callback. No buffering across
/// blocks.
pub struct AudioDownsampler {
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl AudioDownsampler {
    /// Spawn the conversion loop. The input rate must be an integer multiple
    /// of the target rate (48kHz -> 16kHz gives R = 3).
    pub fn spawn<F>(
        input_rate: u32,
        target_rate: u32,
        mut blocks: mpsc::Receiver<AudioBlock>,
        on_chunk: F,
    ) -> Result<Self>
    where
        F: Fn(Vec<u8>) + Send + 'static,
    {
        ensure!(target_rate > 0, "target sample rate must be non-zero");
        ensure!(
            input_rate % target_rate == 0,
            "input rate {}Hz is not an integer multiple of target rate {}Hz",
            input_rate,
            target_rate
        );
        let ratio = (input_rate / target_rate) as usize;

        let running = Arc::new(AtomicBool::new(true));
        let alive = Arc::clone(&running);

        let task = tokio::spawn(async move {
            while let Some(block) = blocks.recv().await {
                // Liveness check keeps late blocks inert after stop().
                if !alive.load(Ordering::SeqCst) {
                    break;
                }
                if block.sample_rate != input_rate {
                    warn!(
                        "dropping block at {}Hz, expected {}Hz",
                        block.sample_rate, input_rate
                    );
                    continue;
                }
                on_chunk(encode_chunk(&block.samples, ratio));
            }
            debug!("downsampler loop finished");
        });

        Ok(Self {
            running,
            task: Some(task),
        })
    }

    /// Disconnect from the audio stream. Idempotent.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}
