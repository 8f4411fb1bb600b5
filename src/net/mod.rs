pub mod channel;
pub mod messages;

pub use channel::{ChannelConfig, ChannelState, TransportChannel};
pub use messages::{ClientMessage, ServerMessage};
