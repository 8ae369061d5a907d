//! The client: push channel events in, a synchronized conversation store out.

mod channel;
mod lifecycle;
mod types;

pub use channel::ChannelEvent;
pub use lifecycle::Client;
pub use types::ClientError;
