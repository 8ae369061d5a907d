//! Normalized conversation events and typing notifications

use crate::schema::{
    ChatMessageSegment, ClientEvent, MembershipChangeType, SegmentType, TypingNotification,
    TypingState, UserId,
};
use crate::utils::from_timestamp;
use chrono::{DateTime, Utc};

/// Payload of a conversation event, decided once when the event is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A chat message
    ChatMessage { segments: Vec<ChatMessageSegment> },
    /// The conversation was renamed
    Rename { new_name: String, old_name: String },
    /// Participants joined or left
    MembershipChange {
        change_type: MembershipChangeType,
        participant_ids: Vec<UserId>,
    },
    /// Any other event
    Generic,
}

/// An event in a conversation's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEvent {
    /// Server-assigned event id, if the server sent one
    pub id: Option<String>,
    pub conversation_id: String,
    pub sender_id: Option<UserId>,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl ConversationEvent {
    /// Plain text of a chat message, with line breaks as `\n`. `None` for other kinds.
    pub fn text(&self) -> Option<String> {
        match &self.kind {
            EventKind::ChatMessage { segments } => Some(
                segments
                    .iter()
                    .map(|segment| match segment.segment_type {
                        SegmentType::LineBreak => "\n",
                        _ => segment.text.as_str(),
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn is_chat_message(&self) -> bool {
        matches!(self.kind, EventKind::ChatMessage { .. })
    }
}

impl From<ClientEvent> for ConversationEvent {
    /// Classify by populated payload: chat message, then rename, then membership change.
    fn from(event: ClientEvent) -> Self {
        let kind = if let Some(message) = event.chat_message {
            EventKind::ChatMessage {
                segments: message.segments,
            }
        } else if let Some(rename) = event.conversation_rename {
            EventKind::Rename {
                new_name: rename.new_name,
                old_name: rename.old_name,
            }
        } else if let Some(change) = event.membership_change {
            EventKind::MembershipChange {
                change_type: change.change_type,
                participant_ids: change.participant_ids,
            }
        } else {
            EventKind::Generic
        };

        Self {
            id: event.event_id,
            conversation_id: event.conversation_id.id,
            sender_id: event.sender_id,
            timestamp: from_timestamp(event.timestamp),
            kind,
        }
    }
}

/// A user's typing state in a conversation. Published, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingStatus {
    pub conversation_id: String,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub state: TypingState,
}

impl From<TypingNotification> for TypingStatus {
    fn from(notification: TypingNotification) -> Self {
        Self {
            conversation_id: notification.conversation_id.id,
            user_id: notification.user_id,
            timestamp: from_timestamp(notification.timestamp),
            state: notification.state,
        }
    }
}
