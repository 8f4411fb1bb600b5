use anyhow::{ensure, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// One raw video frame at the source's native resolution.
///
/// Frames are immutable once produced; the capture side replaces (never
/// merges) the previous frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB8, row-major
    pub rgb: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    /// Encode as JPEG at the given quality (0-100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        ensure!(
            self.rgb.len() == (self.width * self.height * 3) as usize,
            "frame buffer is {} bytes, expected {} for {}x{} RGB8",
            self.rgb.len(),
            self.width * self.height * 3,
            self.width,
            self.height
        );

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
        encoder
            .encode(&self.rgb, self.width, self.height, ExtendedColorType::Rgb8)
            .context("JPEG encoding failed")?;
        Ok(jpeg)
    }

    /// Encode as JPEG and wrap in base64 for the wire.
    pub fn encode_jpeg_base64(&self, quality: u8) -> Result<String> {
        Ok(STANDARD.encode(self.encode_jpeg(quality)?))
    }
}
