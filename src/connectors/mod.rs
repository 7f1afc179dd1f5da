//! Connectors for integrating streams with external push-based systems

pub mod channel;
pub mod push;

pub use channel::ChannelSink;
pub use push::{PushSink, PushSource, Pusher};
