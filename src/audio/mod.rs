pub mod downsampler;
pub mod playback;

pub use downsampler::{decimate, encode_chunk, to_pcm16, AudioDownsampler};
pub use playback::{decode_pcm16, DecodeError, DeviceSink, PlaybackScheduler, PlaybackSink};
