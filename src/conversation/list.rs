//!
//! The conversation store and synchronizer.
//!
//! `ConversationList` owns every known conversation and the sync watermark. It merges two
//! update sources into each conversation's append-only log:
//!
//! - Push updates (`apply_push`): trusted as ordered. An event advances the watermark
//!   unconditionally and is appended if its conversation is known.
//! - Resync (`resync`): a catch-up fetch of everything since the watermark. Only events newer
//!   than the watermark read when the resync started, and not already in the log, are routed
//!   through the push path, so events already delivered by push are not appended again. The
//!   watermark never ends a resync below an event it appended.
//!
//! All mutation happens under one lock. Notifications produced while applying an update are
//! collected under the lock and fired after it is released, in application order: first on the
//! list-wide bus, then on the conversation's own bus.

use super::event::{ConversationEvent, TypingStatus};
use super::model::Conversation;
use super::users::UserList;
use crate::api::ChatService;
use crate::events::{EventBus, SubscriptionId};
use crate::schema::{
    ChatMessageSegment, ClientConversation, ClientConversationState, ClientEvent, StateUpdate,
    TypingNotification,
};
use crate::session::InitialSnapshot;
use crate::transport::RequestError;
use crate::utils::from_timestamp;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Summary of one successful resync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncStats {
    /// Known conversations whose metadata was replaced
    pub conversations_updated: usize,
    /// Conversations created from the response
    pub conversations_added: usize,
    /// Events appended to known conversations
    pub events_applied: usize,
}

enum Notification {
    Event(Arc<EventBus<ConversationEvent>>, ConversationEvent),
    Typing(Arc<EventBus<TypingStatus>>, TypingStatus),
}

struct StoreState {
    conversations: HashMap<String, Conversation>,
    users: Arc<UserList>,
    watermark: DateTime<Utc>,
    seeded: bool,
}

impl StoreState {
    fn add_conversation(&mut self, metadata: ClientConversation, events: Vec<ClientEvent>) {
        let id = metadata.conversation_id.id.clone();
        info!("Adding new conversation: {}", id);
        let conversation = Conversation::new(metadata, events, self.users.clone());
        self.conversations.insert(id, conversation);
    }

    fn raise_watermark(&mut self, timestamp: u64) {
        self.watermark = self.watermark.max(from_timestamp(timestamp));
    }

    /// Replace a known conversation's metadata, or create it with an empty log.
    fn handle_conversation(&mut self, metadata: ClientConversation) -> bool {
        match self.conversations.get_mut(&metadata.conversation_id.id) {
            Some(conversation) => {
                conversation.update_metadata(metadata);
                false
            }
            None => {
                self.add_conversation(metadata, Vec::new());
                true
            }
        }
    }

    /// Advance the watermark to the event's timestamp and append it to its conversation.
    ///
    /// Returns whether the event was appended.
    fn handle_event(&mut self, event: ClientEvent, notifications: &mut Vec<Notification>) -> bool {
        self.watermark = from_timestamp(event.timestamp);
        let Some(conversation) = self.conversations.get_mut(&event.conversation_id.id) else {
            warn!(
                "Received ClientEvent for unknown conversation {}",
                event.conversation_id.id
            );
            return false;
        };
        let event = conversation.add_event(event);
        notifications.push(Notification::Event(conversation.event_bus(), event));
        true
    }

    fn handle_typing(
        &mut self,
        notification: TypingNotification,
        notifications: &mut Vec<Notification>,
    ) {
        match self.conversations.get(&notification.conversation_id.id) {
            Some(conversation) => notifications.push(Notification::Typing(
                conversation.typing_bus(),
                TypingStatus::from(notification),
            )),
            None => warn!(
                "Received ClientSetTypingNotification for unknown conversation {}",
                notification.conversation_id.id
            ),
        }
    }
}

/// All known conversations, kept consistent with the server.
pub struct ConversationList {
    service: Arc<dyn ChatService>,
    state: Mutex<StoreState>,
    on_event: EventBus<ConversationEvent>,
    on_typing: EventBus<TypingStatus>,
}

impl ConversationList {
    /// An empty, unseeded store. The watermark starts at the epoch.
    pub fn new(service: Arc<dyn ChatService>) -> Self {
        Self {
            service,
            state: Mutex::new(StoreState {
                conversations: HashMap::new(),
                users: Arc::new(UserList::default()),
                watermark: DateTime::UNIX_EPOCH,
                seeded: false,
            }),
            on_event: EventBus::new(),
            on_typing: EventBus::new(),
        }
    }

    /// A store seeded from a bootstrap snapshot.
    pub fn from_snapshot(service: Arc<dyn ChatService>, snapshot: InitialSnapshot) -> Self {
        let list = Self::new(service);
        list.seed(snapshot);
        list
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Populate the store from the bootstrap snapshot and set the initial watermark.
    ///
    /// Only the first call has an effect; returns whether this call seeded the store.
    pub fn seed(&self, snapshot: InitialSnapshot) -> bool {
        let mut state = self.lock();
        if state.seeded {
            warn!("Conversation list is already seeded, ignoring snapshot");
            return false;
        }

        state.users = Arc::new(UserList::new(
            &snapshot.self_entity,
            &snapshot.entities,
            &snapshot.conversation_participants,
        ));
        for conversation_state in snapshot.conversation_states {
            state.add_conversation(conversation_state.conversation, conversation_state.events);
        }
        state.watermark = snapshot.sync_timestamp;
        state.seeded = true;
        info!(
            "Seeded {} conversations, sync timestamp {}",
            state.conversations.len(),
            state.watermark
        );
        true
    }

    /// Apply one update delivered by the push channel.
    ///
    /// A conversation snapshot replaces or creates the conversation. A typing notification is
    /// published if its conversation is known. An event always advances the watermark and is
    /// appended and published if its conversation is known. Updates for unknown conversations
    /// are logged and dropped.
    pub fn apply_push(&self, update: StateUpdate) {
        let mut notifications = Vec::new();
        {
            let mut state = self.lock();
            if let Some(conversation) = update.conversation {
                state.handle_conversation(conversation);
            }
            if let Some(typing) = update.typing_notification {
                state.handle_typing(typing, &mut notifications);
            }
            if let Some(event) = update.event_notification {
                state.handle_event(event, &mut notifications);
            }
        }
        self.dispatch(notifications);
    }

    /// Fetch and merge everything since the watermark.
    ///
    /// Known conversations get their metadata replaced, then each returned event newer than the
    /// watermark at the start of the call goes through the push path, unless its id is already
    /// in the log. Unknown conversations are created with every returned event. Afterwards the
    /// watermark is at least the newest event appended.
    ///
    /// # Returns
    /// `None` if the fetch failed. The failure is logged and the store is left untouched.
    pub async fn resync(&self) -> Option<ResyncStats> {
        let since = self.watermark();
        info!("Syncing events since {}", since);

        let response = match self.service.sync_all_new_events(since).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to sync events, some events may be lost: {}", e);
                return None;
            }
        };

        let mut stats = ResyncStats::default();
        let mut notifications = Vec::new();
        {
            let mut state = self.lock();
            let mut newest: Option<u64> = None;
            for conversation_state in response.conversation_states {
                let ClientConversationState {
                    conversation_id,
                    conversation,
                    events,
                } = conversation_state;
                let Some(existing) = state.conversations.get_mut(&conversation_id.id) else {
                    newest = events.iter().map(|e| e.timestamp).chain(newest).max();
                    state.add_conversation(conversation, events);
                    stats.conversations_added += 1;
                    continue;
                };
                existing.update_metadata(conversation);
                stats.conversations_updated += 1;

                for event in events {
                    if from_timestamp(event.timestamp) <= since {
                        continue;
                    }
                    let delivered = event.event_id.as_deref().is_some_and(|id| {
                        state
                            .conversations
                            .get(&conversation_id.id)
                            .is_some_and(|conversation| conversation.contains_event(id))
                    });
                    if delivered {
                        debug!("Skipping already delivered event {:?}", event.event_id);
                        continue;
                    }
                    let timestamp = event.timestamp;
                    if state.handle_event(event, &mut notifications) {
                        newest = newest.max(Some(timestamp));
                        stats.events_applied += 1;
                    }
                }
            }
            if let Some(timestamp) = newest {
                state.raise_watermark(timestamp);
            }
        }
        self.dispatch(notifications);

        debug!("Resync finished: {:?}", stats);
        Some(stats)
    }

    fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            match notification {
                Notification::Event(bus, event) => {
                    self.on_event.fire(&event);
                    bus.fire(&event);
                }
                Notification::Typing(bus, status) => {
                    self.on_typing.fire(&status);
                    bus.fire(&status);
                }
            }
        }
    }

    /// Send a chat message to a conversation.
    ///
    /// # Errors
    /// The `RequestError` from the service; the message was not delivered.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        segments: &[ChatMessageSegment],
    ) -> Result<(), RequestError> {
        self.service
            .send_chat_message(conversation_id, segments)
            .await
            .inspect_err(|e| warn!("Failed to send message: {}", e))
    }

    /// Snapshot of a conversation.
    pub fn get(&self, conversation_id: &str) -> Option<Conversation> {
        self.lock().conversations.get(conversation_id).cloned()
    }

    /// Snapshots of every conversation, most recently modified first.
    pub fn get_all(&self) -> Vec<Conversation> {
        let mut conversations: Vec<Conversation> =
            self.lock().conversations.values().cloned().collect();
        conversations.sort_by(|a, b| {
            b.last_modified()
                .cmp(&a.last_modified())
                .then_with(|| a.id().cmp(b.id()))
        });
        conversations
    }

    pub fn len(&self) -> usize {
        self.lock().conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp of the newest event known to be applied.
    pub fn watermark(&self) -> DateTime<Utc> {
        self.lock().watermark
    }

    pub fn users(&self) -> Arc<UserList> {
        self.lock().users.clone()
    }

    /// Subscribe to events appended to any conversation.
    pub fn on_event<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ConversationEvent) + Send + Sync + 'static,
    {
        self.on_event.subscribe(handler)
    }

    /// Subscribe to typing updates in any conversation.
    pub fn on_typing<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TypingStatus) + Send + Sync + 'static,
    {
        self.on_typing.subscribe(handler)
    }

    pub fn unsubscribe_event(&self, id: SubscriptionId) -> bool {
        self.on_event.unsubscribe(id)
    }

    pub fn unsubscribe_typing(&self, id: SubscriptionId) -> bool {
        self.on_typing.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeChatService;
    use crate::schema::records::fixtures::{
        chat_event, conversation, conversation_state, entity, typing,
    };
    use crate::schema::{ClientEntity, Schema};
    use crate::transport::NetworkError;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const T0: u64 = 1_400_000_000_000_000;
    const T1: u64 = T0 + 1_000_000;
    const T2: u64 = T0 + 2_000_000;

    fn snapshot(states: Vec<Value>, sync_timestamp: u64) -> InitialSnapshot {
        let conversation_states: Vec<ClientConversationState> = states
            .iter()
            .map(|state| ClientConversationState::parse(state).unwrap())
            .collect();
        let conversation_participants = conversation_states
            .iter()
            .flat_map(|s| s.conversation.participant_data.clone())
            .collect();
        InitialSnapshot {
            conversation_states,
            self_entity: ClientEntity::parse(&entity("me", "Me Self")).unwrap(),
            entities: vec![ClientEntity::parse(&entity("alice", "Alice Smith")).unwrap()],
            conversation_participants,
            sync_timestamp: from_timestamp(sync_timestamp),
        }
    }

    /// A store seeded with conversation `c1` holding one event at `T0`, watermark `T0`.
    fn seeded() -> (Arc<FakeChatService>, ConversationList) {
        let service = Arc::new(FakeChatService::new());
        let list = ConversationList::from_snapshot(
            service.clone(),
            snapshot(
                vec![conversation_state(
                    "c1",
                    Some("Team"),
                    vec![chat_event("c1", "e0", T0, "old")],
                )],
                T0,
            ),
        );
        (service, list)
    }

    fn event_update(conversation_id: &str, event_id: &str, timestamp: u64) -> StateUpdate {
        StateUpdate::parse(&json!([
            null,
            null,
            [chat_event(conversation_id, event_id, timestamp, "text")]
        ]))
        .unwrap()
    }

    fn sync_response(states: Vec<Value>) -> Value {
        json!(["csanerp", [1], T2, states])
    }

    fn event_ids(list: &ConversationList, conversation_id: &str) -> Vec<String> {
        list.get(conversation_id)
            .unwrap()
            .events()
            .iter()
            .filter_map(|e| e.id.clone())
            .collect()
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&ConversationEvent) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        (count, move |_: &ConversationEvent| {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_seed_populates_store_once() {
        let (_, list) = seeded();
        assert_eq!(list.len(), 1);
        assert_eq!(list.watermark(), from_timestamp(T0));
        assert_eq!(event_ids(&list, "c1"), vec!["e0"]);
        assert_eq!(list.users().get(&list.get("c1").unwrap().participant_ids()[0]).full_name, "Alice Smith");

        assert!(!list.seed(snapshot(vec![], T2)));
        assert_eq!(list.len(), 1);
        assert_eq!(list.watermark(), from_timestamp(T0));
    }

    #[test]
    fn test_push_event_appends_and_fires_both_buses() {
        let (_, list) = seeded();
        let (global, global_handler) = counter();
        let (local, local_handler) = counter();
        list.on_event(global_handler);
        list.get("c1").unwrap().on_event(local_handler);

        list.apply_push(event_update("c1", "e1", T1));

        assert_eq!(event_ids(&list, "c1"), vec!["e0", "e1"]);
        assert_eq!(global.load(Ordering::SeqCst), 1);
        assert_eq!(local.load(Ordering::SeqCst), 1);
        assert_eq!(list.watermark(), from_timestamp(T1));
    }

    #[test]
    fn test_push_event_for_unknown_conversation_is_dropped_but_advances_watermark() {
        let (_, list) = seeded();
        let (global, handler) = counter();
        list.on_event(handler);

        list.apply_push(event_update("unknown", "e1", T1));

        assert!(list.get("unknown").is_none());
        assert_eq!(global.load(Ordering::SeqCst), 0);
        assert_eq!(list.watermark(), from_timestamp(T1));
    }

    #[test]
    fn test_push_watermark_follows_delivery_order() {
        let (_, list) = seeded();
        list.apply_push(event_update("c1", "e2", T2));
        list.apply_push(event_update("c1", "e1", T1));
        // Out-of-order push moves the watermark backwards.
        assert_eq!(list.watermark(), from_timestamp(T1));
        assert_eq!(event_ids(&list, "c1"), vec!["e0", "e2", "e1"]);
    }

    #[test]
    fn test_typing_notification_is_published_not_stored() {
        let (_, list) = seeded();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let global = seen.clone();
        list.on_typing(move |status: &TypingStatus| {
            global.lock().unwrap().push(format!("global:{}", status.user_id.chat_id));
        });
        let local = seen.clone();
        list.get("c1").unwrap().on_typing(move |status: &TypingStatus| {
            local.lock().unwrap().push(format!("c1:{}", status.user_id.chat_id));
        });

        let update = |conversation_id: &str| {
            StateUpdate::parse(&json!([null, null, null, null, typing(conversation_id, "alice", T2)]))
                .unwrap()
        };
        list.apply_push(update("c1"));
        list.apply_push(update("unknown"));

        assert_eq!(*seen.lock().unwrap(), vec!["global:alice", "c1:alice"]);
        assert_eq!(list.watermark(), from_timestamp(T0));
        assert_eq!(event_ids(&list, "c1"), vec!["e0"]);
    }

    #[test]
    fn test_push_conversation_replaces_or_creates() {
        let (_, list) = seeded();
        let update = |value: Value| StateUpdate::parse(&json!([null, [value]])).unwrap();

        list.apply_push(update(conversation("c1", Some("Renamed"), &["bob"])));
        let c1 = list.get("c1").unwrap();
        assert_eq!(c1.name(), Some("Renamed"));
        assert_eq!(c1.participant_ids().len(), 1);
        assert_eq!(event_ids(&list, "c1"), vec!["e0"]);

        list.apply_push(update(conversation("c2", None, &["alice"])));
        assert!(list.get("c2").unwrap().events().is_empty());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_empty_update_is_ignored() {
        let (_, list) = seeded();
        list.apply_push(StateUpdate::default());
        assert_eq!(list.len(), 1);
        assert_eq!(list.watermark(), from_timestamp(T0));
    }

    #[tokio::test]
    async fn test_resync_is_idempotent() {
        let (service, list) = seeded();
        let response = sync_response(vec![conversation_state(
            "c1",
            Some("Team"),
            vec![chat_event("c1", "e1", T1, "new"), chat_event("c1", "e2", T2, "newer")],
        )]);
        service.push_sync(response.clone());
        service.push_sync(response);

        let first = list.resync().await.unwrap();
        assert_eq!(first.events_applied, 2);
        let second = list.resync().await.unwrap();
        assert_eq!(second.events_applied, 0);
        assert_eq!(second.conversations_updated, 1);

        assert_eq!(event_ids(&list, "c1"), vec!["e0", "e1", "e2"]);
        assert_eq!(list.watermark(), from_timestamp(T2));
    }

    #[tokio::test]
    async fn test_resync_merges_with_push_without_duplicates() {
        let (service, list) = seeded();
        list.apply_push(event_update("c1", "e1", T1));
        service.push_sync(sync_response(vec![conversation_state(
            "c1",
            Some("Team"),
            vec![chat_event("c1", "e0", T0, "old"), chat_event("c1", "e1", T1, "text")],
        )]));

        let stats = list.resync().await.unwrap();
        assert_eq!(stats.events_applied, 0);
        assert_eq!(event_ids(&list, "c1"), vec!["e0", "e1"]);
        assert_eq!(service.sync_since.lock().unwrap()[0], from_timestamp(T1));
    }

    #[tokio::test]
    async fn test_resync_creates_unknown_conversation_with_all_events() {
        let (service, list) = seeded();
        let (global, handler) = counter();
        list.on_event(handler);
        service.push_sync(sync_response(vec![conversation_state(
            "c2",
            None,
            vec![chat_event("c2", "a", T0 - 5, "x"), chat_event("c2", "b", T1, "y")],
        )]));

        let stats = list.resync().await.unwrap();
        assert_eq!(stats.conversations_added, 1);
        assert_eq!(event_ids(&list, "c2"), vec!["a", "b"]);
        assert_eq!(global.load(Ordering::SeqCst), 0);
        assert_eq!(list.watermark(), from_timestamp(T1));
    }

    #[tokio::test]
    async fn test_resync_twice_after_creating_conversation_does_not_duplicate() {
        let service = Arc::new(FakeChatService::new());
        let list = ConversationList::from_snapshot(service.clone(), snapshot(vec![], T0));
        let response = sync_response(vec![conversation_state(
            "c2",
            None,
            vec![chat_event("c2", "b", T1, "y")],
        )]);
        service.push_sync(response.clone());
        service.push_sync(response);

        assert_eq!(list.resync().await.unwrap().conversations_added, 1);
        let second = list.resync().await.unwrap();
        assert_eq!(second.conversations_updated, 1);
        assert_eq!(second.events_applied, 0);
        assert_eq!(event_ids(&list, "c2"), vec!["b"]);
        assert_eq!(service.sync_since.lock().unwrap()[1], from_timestamp(T1));
    }

    #[tokio::test]
    async fn test_resync_keeps_every_new_event_of_an_unsorted_response() {
        let (service, list) = seeded();
        service.push_sync(sync_response(vec![conversation_state(
            "c1",
            Some("Team"),
            vec![chat_event("c1", "late", T1 + 5, "b"), chat_event("c1", "early", T1, "a")],
        )]));

        let stats = list.resync().await.unwrap();
        assert_eq!(stats.events_applied, 2);
        assert_eq!(event_ids(&list, "c1"), vec!["e0", "late", "early"]);
        assert_eq!(list.watermark(), from_timestamp(T1 + 5));
    }

    #[tokio::test]
    async fn test_resync_skips_events_pushed_while_in_flight() {
        let (service, list) = seeded();
        let list = Arc::new(list);
        service.push_sync(sync_response(vec![conversation_state(
            "c1",
            Some("Team"),
            vec![chat_event("c1", "e1", T1, "text")],
        )]));
        let pusher = list.clone();
        service.before_sync(move || pusher.apply_push(event_update("c1", "e1", T1)));

        let stats = list.resync().await.unwrap();
        assert_eq!(service.sync_since.lock().unwrap()[0], from_timestamp(T0));
        assert_eq!(stats.events_applied, 0);
        assert_eq!(event_ids(&list, "c1"), vec!["e0", "e1"]);
        assert_eq!(list.watermark(), from_timestamp(T1));
    }

    #[tokio::test]
    async fn test_resync_network_error_is_swallowed() {
        let (service, list) = seeded();
        service.push_sync_error(NetworkError::Timeout);
        assert_eq!(list.resync().await, None);
        assert_eq!(event_ids(&list, "c1"), vec!["e0"]);
        assert_eq!(list.watermark(), from_timestamp(T0));
    }

    #[tokio::test]
    async fn test_push_then_resync_end_to_end() {
        let (service, list) = seeded();
        let (global, global_handler) = counter();
        let (local, local_handler) = counter();
        list.on_event(global_handler);
        list.get("c1").unwrap().on_event(local_handler);

        list.apply_push(event_update("c1", "e1", T1));
        assert_eq!(list.get("c1").unwrap().events().len(), 2);
        assert_eq!(global.load(Ordering::SeqCst), 1);
        assert_eq!(local.load(Ordering::SeqCst), 1);
        assert_eq!(list.watermark(), from_timestamp(T1));

        service.push_sync(sync_response(vec![conversation_state(
            "c1",
            Some("Team"),
            vec![chat_event("c1", "e1", T1, "text"), chat_event("c1", "e0", T0, "old")],
        )]));
        list.resync().await.unwrap();
        assert_eq!(list.get("c1").unwrap().events().len(), 2);
        assert_eq!(global.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handlers_can_read_the_store() {
        let (_, list) = seeded();
        let list = Arc::new(list);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let reader = list.clone();
        let sink = seen.clone();
        list.on_event(move |event: &ConversationEvent| {
            let length = reader.get(&event.conversation_id).map(|c| c.events().len());
            sink.lock().unwrap().push(length);
        });

        list.apply_push(event_update("c1", "e1", T1));
        assert_eq!(*seen.lock().unwrap(), vec![Some(2)]);
    }

    #[tokio::test]
    async fn test_send_message_returns_typed_failure() {
        let (service, list) = seeded();
        list.send_message("c1", &[ChatMessageSegment::text("hi")])
            .await
            .unwrap();
        let err = list
            .send_message("missing", &[ChatMessageSegment::text("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Network(NetworkError::ResponseStatus(_))));
        assert_eq!(service.calls(), vec!["send:c1:1", "send:missing:1"]);
    }
}
