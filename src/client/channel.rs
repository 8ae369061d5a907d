use crate::schema::StateUpdate;
use crate::session::ChannelIdentity;

/// What the push channel reports to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// First connection, with the identity the channel assigned to this client
    Connected(ChannelIdentity),
    /// Connection restored after a drop
    Reconnected,
    /// Connection lost
    Disconnected,
    /// One demultiplexed state update
    Update(StateUpdate),
}
