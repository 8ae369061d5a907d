//! In-memory `ChatService` for tests.

use super::service::ChatService;
use crate::schema::{ChatMessageSegment, Schema, SyncAllNewEventsResponse};
use crate::session::ChannelIdentity;
use crate::transport::{NetworkError, RequestError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Records every call in order and answers full syncs from a queue.
#[derive(Default)]
pub struct FakeChatService {
    pub calls: Mutex<Vec<String>>,
    pub sync_since: Mutex<Vec<DateTime<Utc>>>,
    sync_responses: Mutex<VecDeque<Result<SyncAllNewEventsResponse, RequestError>>>,
    sync_hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    fail_presence: bool,
}

impl FakeChatService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presence and active-client calls fail with a status error.
    pub fn failing_presence() -> Self {
        Self {
            fail_presence: true,
            ..Self::default()
        }
    }

    /// Queue a full-sync response built from `[tag, [status], sync_timestamp, states]`.
    pub fn push_sync(&self, value: Value) {
        let response = SyncAllNewEventsResponse::parse(&value).map_err(|e| {
            RequestError::Network(NetworkError::Parse(e.to_string()))
        });
        self.sync_responses.lock().unwrap().push_back(response);
    }

    pub fn push_sync_error(&self, error: NetworkError) {
        self.sync_responses
            .lock()
            .unwrap()
            .push_back(Err(RequestError::Network(error)));
    }

    /// Run `hook` inside every full sync, after the request has been recorded.
    pub fn before_sync(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.sync_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn presence_result(&self) -> Result<(), RequestError> {
        if self.fail_presence {
            Err(RequestError::Network(NetworkError::ResponseStatus(
                "ERROR".to_string(),
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ChatService for FakeChatService {
    fn bind_channel(&self, identity: &ChannelIdentity) {
        self.record(format!("bind:{}/{}", identity.email, identity.client_id));
    }

    async fn sync_all_new_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<SyncAllNewEventsResponse, RequestError> {
        self.record("sync");
        self.sync_since.lock().unwrap().push(since);
        if let Some(hook) = self.sync_hook.lock().unwrap().as_ref() {
            hook();
        }
        self.sync_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(RequestError::Network(NetworkError::Timeout)))
    }

    async fn send_chat_message(
        &self,
        conversation_id: &str,
        segments: &[ChatMessageSegment],
    ) -> Result<(), RequestError> {
        self.record(format!("send:{}:{}", conversation_id, segments.len()));
        if conversation_id == "missing" {
            return Err(RequestError::Network(NetworkError::ResponseStatus(
                "ERROR_INVALID_CONVERSATION".to_string(),
            )));
        }
        Ok(())
    }

    async fn set_presence(&self, online: bool) -> Result<(), RequestError> {
        self.record(format!("presence:{}", online));
        self.presence_result()
    }

    async fn set_active_client(&self, active: bool) -> Result<(), RequestError> {
        self.record(format!("active:{}", active));
        self.presence_result()
    }
}
