//! Typed records decoded from the chat service's positional arrays.
//!
//! Each record documents the array indices it reads. Indices not listed are ignored.

use super::pblite::{
    Schema, ensure_message, field, flag, integer_field, message, optional_integer,
    optional_message, optional_string, repeated, repeated_strings, string_field,
};
use super::types::{
    ConversationType, MembershipChangeType, SchemaError, SegmentType, TypingState,
};
use serde_json::{Value, json};

/// Identifier of a conversation. `[id]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId {
    pub id: String,
}

impl Schema for ConversationId {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "conversation_id")?;
        Ok(Self {
            id: string_field(value, 0, "conversation_id.id")?,
        })
    }
}

/// Identifier of a user. `[gaia_id, chat_id]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId {
    pub gaia_id: String,
    pub chat_id: String,
}

impl Schema for UserId {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "user_id")?;
        Ok(Self {
            gaia_id: string_field(value, 0, "user_id.gaia_id")?,
            chat_id: string_field(value, 1, "user_id.chat_id")?,
        })
    }
}

/// One formatted run of text in a chat message.
///
/// `[type, text, [bold, italic, strikethrough, underline], [link_target]]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessageSegment {
    pub segment_type: SegmentType,
    pub text: String,
    pub is_bold: bool,
    pub is_italic: bool,
    pub is_strikethrough: bool,
    pub is_underline: bool,
    pub link_target: Option<String>,
}

impl ChatMessageSegment {
    /// A plain text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            segment_type: SegmentType::Text,
            text: text.into(),
            is_bold: false,
            is_italic: false,
            is_strikethrough: false,
            is_underline: false,
            link_target: None,
        }
    }

    /// A line break segment.
    pub fn line_break() -> Self {
        Self {
            segment_type: SegmentType::LineBreak,
            ..Self::text("\n")
        }
    }

    /// A link segment showing `text` and pointing at `target`.
    pub fn link(text: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            segment_type: SegmentType::Link,
            link_target: Some(target.into()),
            ..Self::text(text)
        }
    }

    /// Positional form used in outgoing requests.
    pub fn serialize(&self) -> Value {
        json!([
            self.segment_type.code(),
            self.text,
            [
                u8::from(self.is_bold),
                u8::from(self.is_italic),
                u8::from(self.is_strikethrough),
                u8::from(self.is_underline),
            ],
            [self.link_target],
        ])
    }
}

impl Schema for ChatMessageSegment {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "segment")?;
        let formatting = field(value, 2).cloned().unwrap_or(Value::Null);
        let link_target = match field(value, 3) {
            Some(link_data) => optional_string(link_data, 0, "segment.link_target")?,
            None => None,
        };
        Ok(Self {
            segment_type: SegmentType::from(integer_field(value, 0, "segment.type")?),
            text: optional_string(value, 1, "segment.text")?.unwrap_or_default(),
            is_bold: flag(&formatting, 0),
            is_italic: flag(&formatting, 1),
            is_strikethrough: flag(&formatting, 2),
            is_underline: flag(&formatting, 3),
            link_target,
        })
    }
}

/// Chat message payload. `[_, annotation, [segments, attachments]]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub segments: Vec<ChatMessageSegment>,
}

impl Schema for ChatMessage {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "chat_message")?;
        let segments = match field(value, 2) {
            Some(content) => repeated(content, 0, "chat_message.segments")?,
            None => Vec::new(),
        };
        Ok(Self { segments })
    }
}

/// Membership change payload. `[type, _, participant_ids]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub change_type: MembershipChangeType,
    pub participant_ids: Vec<UserId>,
}

impl Schema for MembershipChange {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "membership_change")?;
        Ok(Self {
            change_type: MembershipChangeType::from(integer_field(
                value,
                0,
                "membership_change.type",
            )?),
            participant_ids: repeated(value, 2, "membership_change.participant_ids")?,
        })
    }
}

/// Rename payload. `[new_name, old_name]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRename {
    pub new_name: String,
    pub old_name: String,
}

impl Schema for ConversationRename {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "conversation_rename")?;
        Ok(Self {
            new_name: optional_string(value, 0, "conversation_rename.new_name")?.unwrap_or_default(),
            old_name: optional_string(value, 1, "conversation_rename.old_name")?.unwrap_or_default(),
        })
    }
}

/// An event in a conversation as delivered by the server.
///
/// Indices: `0` conversation id, `1` sender id, `2` timestamp (microseconds), `6` chat message,
/// `8` membership change, `9` rename, `11` event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEvent {
    pub conversation_id: ConversationId,
    pub sender_id: Option<UserId>,
    pub timestamp: u64,
    pub event_id: Option<String>,
    pub chat_message: Option<ChatMessage>,
    pub membership_change: Option<MembershipChange>,
    pub conversation_rename: Option<ConversationRename>,
}

impl Schema for ClientEvent {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "event")?;
        Ok(Self {
            conversation_id: message(value, 0, "event.conversation_id")?,
            sender_id: optional_message(value, 1)?,
            timestamp: integer_field(value, 2, "event.timestamp")?,
            chat_message: optional_message(value, 6)?,
            membership_change: optional_message(value, 8)?,
            conversation_rename: optional_message(value, 9)?,
            event_id: optional_string(value, 11, "event.event_id")?,
        })
    }
}

/// The caller's own view of a conversation. Index `9` is the sort timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelfConversationState {
    pub sort_timestamp: Option<u64>,
}

impl Schema for SelfConversationState {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "self_conversation_state")?;
        Ok(Self {
            sort_timestamp: optional_integer(value, 9, "self_conversation_state.sort_timestamp")?,
        })
    }
}

/// A conversation participant. `[id, fallback_name]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantData {
    pub id: UserId,
    pub fallback_name: Option<String>,
}

impl Schema for ParticipantData {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "participant_data")?;
        Ok(Self {
            id: message(value, 0, "participant_data.id")?,
            fallback_name: optional_string(value, 1, "participant_data.fallback_name")?,
        })
    }
}

/// Conversation metadata.
///
/// Indices: `0` conversation id, `1` type, `2` name, `3` self conversation state,
/// `12` current participants, `13` participant data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConversation {
    pub conversation_id: ConversationId,
    pub conversation_type: ConversationType,
    pub name: Option<String>,
    pub self_conversation_state: SelfConversationState,
    pub current_participants: Vec<UserId>,
    pub participant_data: Vec<ParticipantData>,
}

impl Schema for ClientConversation {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "conversation")?;
        Ok(Self {
            conversation_id: message(value, 0, "conversation.conversation_id")?,
            conversation_type: ConversationType::from(
                optional_integer(value, 1, "conversation.type")?.unwrap_or(0),
            ),
            name: optional_string(value, 2, "conversation.name")?,
            self_conversation_state: optional_message(value, 3)?.unwrap_or_default(),
            current_participants: repeated(value, 12, "conversation.current_participant")?,
            participant_data: repeated(value, 13, "conversation.participant_data")?,
        })
    }
}

/// A conversation together with its events. `[conversation_id, conversation, events]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConversationState {
    pub conversation_id: ConversationId,
    pub conversation: ClientConversation,
    pub events: Vec<ClientEvent>,
}

impl Schema for ClientConversationState {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "conversation_state")?;
        Ok(Self {
            conversation_id: message(value, 0, "conversation_state.conversation_id")?,
            conversation: message(value, 1, "conversation_state.conversation")?,
            events: repeated(value, 2, "conversation_state.event")?,
        })
    }
}

/// A list of conversation states, as embedded in the bootstrap page.
impl Schema for Vec<ClientConversationState> {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        match value {
            Value::Array(items) => items.iter().map(ClientConversationState::parse).collect(),
            _ => Err(SchemaError::UnexpectedType {
                field: "conversation_state_list",
                expected: "array",
            }),
        }
    }
}

/// Profile properties of an entity. `[type, display_name, first_name, photo_url, emails]`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityProperties {
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub photo_url: Option<String>,
    pub emails: Vec<String>,
}

impl Schema for EntityProperties {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "entity.properties")?;
        Ok(Self {
            display_name: optional_string(value, 1, "entity.properties.display_name")?,
            first_name: optional_string(value, 2, "entity.properties.first_name")?,
            photo_url: optional_string(value, 3, "entity.properties.photo_url")?,
            emails: repeated_strings(value, 4, "entity.properties.emails")?,
        })
    }
}

/// A user or contact. Index `9` is the id, `10` the properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntity {
    pub id: UserId,
    pub properties: EntityProperties,
}

impl Schema for ClientEntity {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "entity")?;
        Ok(Self {
            id: message(value, 9, "entity.id")?,
            properties: optional_message(value, 10)?.unwrap_or_default(),
        })
    }
}

/// Application-level status header. `[status]`
///
/// Status `1` means OK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: u64,
}

impl ResponseHeader {
    pub const STATUS_OK: u64 = 1;

    pub fn is_ok(&self) -> bool {
        self.status == Self::STATUS_OK
    }
}

impl Schema for ResponseHeader {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "response_header")?;
        Ok(Self {
            status: integer_field(value, 0, "response_header.status")?,
        })
    }
}

/// Self-info payload. `[tag, response_header, self_entity]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfInfoResponse {
    pub self_entity: ClientEntity,
}

impl Schema for SelfInfoResponse {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "self_info")?;
        Ok(Self {
            self_entity: message(value, 2, "self_info.self_entity")?,
        })
    }
}

/// Entry in an entity group. `[entity, _]`
#[derive(Debug, Clone, PartialEq, Eq)]
struct EntityGroupMember {
    entity: ClientEntity,
}

impl Schema for EntityGroupMember {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "entity_group.entity")?;
        Ok(Self {
            entity: message(value, 0, "entity_group.entity.entity")?,
        })
    }
}

/// Contacts known at startup.
///
/// `[tag, response_header, entities, _, group1, group2, group3, group4, group5]` where each
/// group is `[_, _, [[entity, _], ...]]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InitialEntities {
    pub entities: Vec<ClientEntity>,
    pub groups: Vec<Vec<ClientEntity>>,
}

impl InitialEntities {
    pub const GROUP_COUNT: usize = 5;

    /// Top-level entities followed by each group's entities, in order. Duplicates are kept.
    pub fn flatten(self) -> Vec<ClientEntity> {
        self.entities
            .into_iter()
            .chain(self.groups.into_iter().flatten())
            .collect()
    }
}

impl Schema for InitialEntities {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "initial_entities")?;
        let entities = repeated(value, 2, "initial_entities.entities")?;
        let mut groups = Vec::with_capacity(Self::GROUP_COUNT);
        for index in 4..4 + Self::GROUP_COUNT {
            let group = match field(value, index) {
                Some(group) => repeated::<EntityGroupMember>(group, 2, "entity_group.entity")?
                    .into_iter()
                    .map(|member| member.entity)
                    .collect(),
                None => Vec::new(),
            };
            groups.push(group);
        }
        Ok(Self { entities, groups })
    }
}

/// Typing notification. `[conversation_id, user_id, timestamp, state]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingNotification {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub timestamp: u64,
    pub state: TypingState,
}

impl Schema for TypingNotification {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "typing_notification")?;
        Ok(Self {
            conversation_id: message(value, 0, "typing_notification.conversation_id")?,
            user_id: message(value, 1, "typing_notification.user_id")?,
            timestamp: integer_field(value, 2, "typing_notification.timestamp")?,
            state: TypingState::from(integer_field(value, 3, "typing_notification.type")?),
        })
    }
}

/// One demultiplexed update from the push channel.
///
/// `[header, [conversation], [event], focus, typing_notification]`. In practice exactly one
/// branch is populated; an update with none is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateUpdate {
    pub conversation: Option<ClientConversation>,
    pub event_notification: Option<ClientEvent>,
    pub typing_notification: Option<TypingNotification>,
}

impl Schema for StateUpdate {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "state_update")?;
        let conversation = match field(value, 1) {
            Some(notification) => optional_message(notification, 0)?,
            None => None,
        };
        let event_notification = match field(value, 2) {
            Some(notification) => optional_message(notification, 0)?,
            None => None,
        };
        Ok(Self {
            conversation,
            event_notification,
            typing_notification: optional_message(value, 4)?,
        })
    }
}

/// Full-sync response. `[tag, response_header, sync_timestamp, conversation_states]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAllNewEventsResponse {
    pub response_header: ResponseHeader,
    pub sync_timestamp: Option<u64>,
    pub conversation_states: Vec<ClientConversationState>,
}

impl Schema for SyncAllNewEventsResponse {
    fn parse(value: &Value) -> Result<Self, SchemaError> {
        ensure_message(value, "sync_all_new_events")?;
        Ok(Self {
            response_header: message(value, 1, "sync_all_new_events.response_header")?,
            sync_timestamp: optional_integer(value, 2, "sync_all_new_events.sync_timestamp")?,
            conversation_states: repeated(value, 3, "sync_all_new_events.conversation_state")?,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Positional builders shared by tests across the crate.
    use serde_json::{Value, json};

    pub fn user(chat_id: &str) -> Value {
        json!([chat_id, chat_id])
    }

    pub fn chat_event(conversation_id: &str, event_id: &str, timestamp: u64, text: &str) -> Value {
        json!([
            [conversation_id],
            user("sender"),
            timestamp,
            null,
            null,
            null,
            [null, [], [[[0, text, [0, 0, 0, 0], [null]]], []]],
            null,
            null,
            null,
            null,
            event_id
        ])
    }

    pub fn rename_event(conversation_id: &str, event_id: &str, timestamp: u64, name: &str) -> Value {
        json!([
            [conversation_id],
            user("sender"),
            timestamp,
            null,
            null,
            null,
            null,
            null,
            null,
            [name, "old"],
            null,
            event_id
        ])
    }

    pub fn conversation(conversation_id: &str, name: Option<&str>, participants: &[&str]) -> Value {
        let data: Vec<Value> = participants
            .iter()
            .map(|p| json!([user(p), format!("{} fallback", p)]))
            .collect();
        let ids: Vec<Value> = participants.iter().map(|p| user(p)).collect();
        json!([
            [conversation_id],
            2,
            name,
            [null, null, null, null, null, null, null, null, null, 1_400_000_000_000_000u64],
            null,
            null,
            null,
            null,
            null,
            null,
            null,
            null,
            ids,
            data
        ])
    }

    pub fn conversation_state(conversation_id: &str, name: Option<&str>, events: Vec<Value>) -> Value {
        json!([
            [conversation_id],
            conversation(conversation_id, name, &["alice", "bob"]),
            events
        ])
    }

    pub fn entity(chat_id: &str, display_name: &str) -> Value {
        json!([
            null, null, null, null, null, null, null, null, null,
            user(chat_id),
            [null, display_name, display_name.split(' ').next(), null, [format!("{}@example.com", chat_id)]]
        ])
    }

    pub fn typing(conversation_id: &str, chat_id: &str, timestamp: u64) -> Value {
        json!([[conversation_id], user(chat_id), timestamp, 1])
    }
}
