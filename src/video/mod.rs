pub mod frame;
pub mod sampler;

pub use frame::VideoFrame;
pub use sampler::FrameSampler;
