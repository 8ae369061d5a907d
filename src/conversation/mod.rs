//! Conversations, their events and the store that keeps them in sync.

mod event;
mod list;
mod model;
mod users;

pub use event::{ConversationEvent, EventKind, TypingStatus};
pub use list::{ConversationList, ResyncStats};
pub use model::Conversation;
pub use users::{UNKNOWN_USER_NAME, User, UserList};
