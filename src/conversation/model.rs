use super::event::{ConversationEvent, TypingStatus};
use super::users::{User, UserList};
use crate::events::{EventBus, SubscriptionId};
use crate::schema::{ClientConversation, ClientEvent, ConversationType, UserId};
use crate::utils::from_timestamp;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A conversation: its latest metadata and its event log.
///
/// Owned by `ConversationList`. Values handed out by the list are snapshots; their event and
/// typing buses are shared with the live conversation, so subscribing through a snapshot
/// receives later notifications.
#[derive(Clone)]
pub struct Conversation {
    metadata: ClientConversation,
    events: Vec<ConversationEvent>,
    users: Arc<UserList>,
    on_event: Arc<EventBus<ConversationEvent>>,
    on_typing: Arc<EventBus<TypingStatus>>,
}

impl Conversation {
    pub(crate) fn new(
        metadata: ClientConversation,
        events: Vec<ClientEvent>,
        users: Arc<UserList>,
    ) -> Self {
        let mut conversation = Self {
            metadata,
            events: Vec::with_capacity(events.len()),
            users,
            on_event: Arc::new(EventBus::new()),
            on_typing: Arc::new(EventBus::new()),
        };
        for event in events {
            conversation.add_event(event);
        }
        conversation
    }

    /// Replace the metadata wholesale.
    pub(crate) fn update_metadata(&mut self, metadata: ClientConversation) {
        self.metadata = metadata;
    }

    /// Classify and append an event.
    pub(crate) fn add_event(&mut self, event: ClientEvent) -> ConversationEvent {
        let event = ConversationEvent::from(event);
        self.events.push(event.clone());
        event
    }

    /// Whether an event with this id is already in the log.
    pub(crate) fn contains_event(&self, event_id: &str) -> bool {
        self.events
            .iter()
            .any(|event| event.id.as_deref() == Some(event_id))
    }

    pub(crate) fn event_bus(&self) -> Arc<EventBus<ConversationEvent>> {
        self.on_event.clone()
    }

    pub(crate) fn typing_bus(&self) -> Arc<EventBus<TypingStatus>> {
        self.on_typing.clone()
    }

    pub fn id(&self) -> &str {
        &self.metadata.conversation_id.id
    }

    /// Custom name, if the conversation has one.
    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    pub fn conversation_type(&self) -> ConversationType {
        self.metadata.conversation_type
    }

    pub fn participant_ids(&self) -> Vec<UserId> {
        self.metadata
            .participant_data
            .iter()
            .map(|participant| participant.id.clone())
            .collect()
    }

    /// Users of the current participants.
    pub fn users(&self) -> Vec<User> {
        self.metadata
            .participant_data
            .iter()
            .map(|participant| self.users.get(&participant.id))
            .collect()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .self_conversation_state
            .sort_timestamp
            .map(from_timestamp)
    }

    /// Events, oldest to newest.
    pub fn events(&self) -> &[ConversationEvent] {
        &self.events
    }

    pub fn on_event<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ConversationEvent) + Send + Sync + 'static,
    {
        self.on_event.subscribe(handler)
    }

    pub fn on_typing<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TypingStatus) + Send + Sync + 'static,
    {
        self.on_typing.subscribe(handler)
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("events", &self.events.len())
            .finish()
    }
}
