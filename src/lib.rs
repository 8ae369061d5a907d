//! Client state synchronization for a web chat service.
//!
//! A session is bootstrapped from the service's initialization page, RPC calls go through an
//! authenticated retrying transport, and a conversation store merges push-delivered updates
//! with catch-up syncs into duplicate-free per-conversation event logs.

pub mod api;
pub mod client;
pub mod config;
pub mod conversation;
pub mod events;
pub mod schema;
pub mod session;
pub mod transport;
pub mod utils;

pub use api::{ChatApi, ChatService};
pub use client::{ChannelEvent, Client, ClientError};
pub use config::ClientConfig;
pub use conversation::{Conversation, ConversationEvent, ConversationList, EventKind, TypingStatus};
pub use events::{EventBus, SubscriptionId};
pub use session::{BootstrapError, ChannelIdentity, InitialSnapshot, Session};
pub use transport::{Cookies, MissingCredentialError, NetworkError, RequestError};
