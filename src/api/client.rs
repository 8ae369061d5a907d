//!
//! Chat RPC client bound to one session.
//!
//! Holds the transport and the current `Session`. The session is replaced, never mutated, when
//! the push channel reports the identity it assigned to this client. Requests read the session
//! once when building their header, so a concurrent rebind never produces a mixed header.

use super::requests::{self, request_header};
use super::service::ChatService;
use crate::schema::{
	ChatMessageSegment, JsLiteralDecoder, LiteralDecoder, Schema, SyncAllNewEventsResponse,
};
use crate::session::{ChannelIdentity, Session};
use crate::transport::{HttpTransport, NetworkError, RequestError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

pub struct ChatApi {
	transport: HttpTransport,
	session: RwLock<Arc<Session>>,
	decoder: Box<dyn LiteralDecoder>,
}

impl ChatApi {
	pub fn new(transport: HttpTransport, session: Session) -> Self {
		Self {
			transport,
			session: RwLock::new(Arc::new(session)),
			decoder: Box::new(JsLiteralDecoder),
		}
	}

	/// The session requests are currently made with.
	pub fn session(&self) -> Arc<Session> {
		self.session
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	/// Replace the session, e.g. after a fresh bootstrap.
	pub fn replace_session(&self, session: Session) {
		*self.session.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(session);
	}

	fn header(&self) -> (Arc<Session>, Value) {
		let session = self.session();
		let header = request_header(&session, &self.transport.config().language);
		(session, header)
	}

	async fn post(
		&self,
		session: &Session,
		endpoint: &str,
		payload: Value,
		use_json: bool,
	) -> Result<Vec<u8>, RequestError> {
		let response = self
			.transport
			.execute(&session.api_key, endpoint, &payload, use_json)
			.await?;
		Ok(response.body)
	}

	/// Post a JSON request and require an `"OK"` status in the response.
	async fn post_checked(
		&self,
		endpoint: &str,
		build: impl FnOnce(Value) -> Value,
	) -> Result<Value, RequestError> {
		let (session, header) = self.header();
		let body = self.post(&session, endpoint, build(header), true).await?;
		Ok(requests::check_json_status(&body)?)
	}

	/// Post a JSON request and return the decoded body as is.
	async fn post_raw(
		&self,
		endpoint: &str,
		build: impl FnOnce(Value) -> Value,
	) -> Result<Value, RequestError> {
		let (session, header) = self.header();
		let body = self.post(&session, endpoint, build(header), true).await?;
		Ok(requests::parse_json(&body)?)
	}

	/// Set the mood shown next to this account's presence.
	pub async fn set_mood(&self, mood: &str) -> Result<(), RequestError> {
		self.post_checked(requests::SET_PRESENCE, |h| requests::set_mood(h, mood))
			.await?;
		Ok(())
	}

	/// Mark a conversation as focused by this client.
	pub async fn set_focus(&self, conversation_id: &str) -> Result<Value, RequestError> {
		self.post_raw(requests::SET_FOCUS, |h| requests::set_focus(h, conversation_id))
			.await
	}

	pub async fn rename_conversation(
		&self,
		conversation_id: &str,
		name: &str,
	) -> Result<(), RequestError> {
		let client_generated_id = rand::random::<u32>();
		self.post_checked(requests::RENAME_CONVERSATION, |h| {
			requests::rename_conversation(h, conversation_id, name, client_generated_id)
		})
		.await?;
		Ok(())
	}

	/// Send an easter egg animation. `egg` must not be empty.
	pub async fn send_easter_egg(&self, conversation_id: &str, egg: &str) -> Result<(), RequestError> {
		self.post_checked(requests::EASTER_EGG, |h| {
			requests::easter_egg(h, conversation_id, egg)
		})
		.await?;
		Ok(())
	}

	pub async fn get_self_info(&self) -> Result<Value, RequestError> {
		self.post_raw(requests::GET_SELF_INFO, requests::get_self_info)
			.await
	}

	pub async fn search_entities(&self, query: &str, max_results: u32) -> Result<Value, RequestError> {
		self.post_raw(requests::SEARCH_ENTITIES, |h| {
			requests::search_entities(h, query, max_results)
		})
		.await
	}

	pub async fn query_presence(&self, chat_id: &str) -> Result<Value, RequestError> {
		self.post_raw(requests::QUERY_PRESENCE, |h| requests::query_presence(h, chat_id))
			.await
	}

	pub async fn get_entity_by_id(&self, chat_ids: &[&str]) -> Result<Value, RequestError> {
		self.post_raw(requests::GET_ENTITY_BY_ID, |h| {
			requests::get_entity_by_id(h, chat_ids)
		})
		.await
	}

	/// Fetch a page of a conversation's history before `event_timestamp`.
	pub async fn get_conversation(
		&self,
		conversation_id: &str,
		num_events: u32,
		continuation_token: Option<&str>,
		event_timestamp: Option<u64>,
	) -> Result<Value, RequestError> {
		self.post_raw(requests::GET_CONVERSATION, |h| {
			requests::get_conversation(
				h,
				conversation_id,
				num_events,
				continuation_token,
				event_timestamp,
			)
		})
		.await
	}

	/// Recent conversations with their latest messages. Limited by the server, unlike the full sync.
	pub async fn sync_recent_conversations(&self) -> Result<Value, RequestError> {
		self.post_raw(
			requests::SYNC_RECENT_CONVERSATIONS,
			requests::sync_recent_conversations,
		)
		.await
	}
}

#[async_trait::async_trait]
impl ChatService for ChatApi {
	fn bind_channel(&self, identity: &ChannelIdentity) {
		let session = self.session().with_channel_identity(identity);
		info!("Bound session to client {}", session.active_client_name());
		self.replace_session(session);
	}

	async fn sync_all_new_events(
		&self,
		since: DateTime<Utc>,
	) -> Result<SyncAllNewEventsResponse, RequestError> {
		let (session, header) = self.header();
		let payload = requests::sync_all_new_events(header, since);
		let body = self
			.post(&session, requests::SYNC_ALL_NEW_EVENTS, payload, false)
			.await?;

		let text = String::from_utf8_lossy(&body);
		let value = self
			.decoder
			.decode(&text)
			.map_err(|e| NetworkError::Parse(e.to_string()))?;
		let response =
			SyncAllNewEventsResponse::parse(&value).map_err(|e| NetworkError::Parse(e.to_string()))?;

		if !response.response_header.is_ok() {
			return Err(NetworkError::ResponseStatus(response.response_header.status.to_string()).into());
		}
		debug!(
			"Full sync returned {} conversations",
			response.conversation_states.len()
		);
		Ok(response)
	}

	async fn send_chat_message(
		&self,
		conversation_id: &str,
		segments: &[ChatMessageSegment],
	) -> Result<(), RequestError> {
		let client_generated_id = rand::random::<u32>();
		self.post_checked(requests::SEND_CHAT_MESSAGE, |h| {
			requests::send_chat_message(h, conversation_id, segments, client_generated_id)
		})
		.await?;
		Ok(())
	}

	async fn set_presence(&self, online: bool) -> Result<(), RequestError> {
		self.post_checked(requests::SET_PRESENCE, |h| {
			requests::set_presence_state(h, online)
		})
		.await?;
		self.post_checked(requests::SET_PRESENCE, |h| {
			requests::set_client_presence(h, online)
		})
		.await?;
		Ok(())
	}

	async fn set_active_client(&self, active: bool) -> Result<(), RequestError> {
		let client_name = self.session().active_client_name();
		self.post_checked(requests::SET_ACTIVE_CLIENT, |h| {
			requests::set_active_client(h, active, &client_name)
		})
		.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::ClientConfig;
	use crate::schema::records::fixtures::{chat_event, conversation_state};
	use crate::session::ChannelParams;
	use crate::transport::{Cookies, REQUIRED_COOKIES};
	use serde_json::json;
	use std::time::Duration;
	use wiremock::matchers::{method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const OK_BODY: &str = r#"{"response_header": {"status": "OK"}}"#;

	fn session() -> Session {
		Session {
			api_key: "api-key".to_string(),
			header_date: "date".to_string(),
			header_version: "version".to_string(),
			header_id: "hid".to_string(),
			client_id: None,
			email: None,
			channel: ChannelParams {
				path: "/p".to_string(),
				clid: "hid".to_string(),
				ec_param: "ec".to_string(),
				prop_param: "prop".to_string(),
			},
		}
	}

	fn api_for(server: &MockServer) -> ChatApi {
		let config = ClientConfig::default()
			.with_api_base_url(format!("{}/chat/v1", server.uri()))
			.with_timeouts(Duration::from_millis(500), Duration::from_millis(500))
			.with_retry(3, Duration::from_millis(5));
		let cookies: Cookies = REQUIRED_COOKIES.iter().map(|name| (*name, "v")).collect();
		ChatApi::new(HttpTransport::new(cookies, config).unwrap(), session())
	}

	async fn request_bodies(server: &MockServer) -> Vec<Value> {
		server
			.received_requests()
			.await
			.unwrap()
			.iter()
			.map(|r| serde_json::from_slice(&r.body).unwrap())
			.collect()
	}

	#[tokio::test]
	async fn test_sync_all_new_events_decodes_protojson() {
		let server = MockServer::start().await;
		let body = json!([
			"csanerp",
			[1],
			"1400000000000000",
			[conversation_state("c1", None, vec![chat_event("c1", "e1", 5, "hi")])]
		]);
		Mock::given(method("POST"))
			.and(path("/chat/v1/conversations/syncallnewevents"))
			.and(query_param("alt", "protojson"))
			.and(query_param("key", "api-key"))
			.respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
			.expect(1)
			.mount(&server)
			.await;

		let response = api_for(&server)
			.sync_all_new_events(crate::utils::from_timestamp(1_400_000_000_000_000))
			.await
			.unwrap();
		assert_eq!(response.sync_timestamp, Some(1_400_000_000_000_000));
		assert_eq!(response.conversation_states[0].events.len(), 1);
	}

	#[tokio::test]
	async fn test_sync_all_new_events_checks_status() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_body_string(r#"["csanerp",[2]]"#))
			.mount(&server)
			.await;

		let err = api_for(&server)
			.sync_all_new_events(Utc::now())
			.await
			.unwrap_err();
		assert_eq!(
			err,
			RequestError::Network(NetworkError::ResponseStatus("2".to_string()))
		);
	}

	#[tokio::test]
	async fn test_sync_all_new_events_reports_unparsable_body() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
			.mount(&server)
			.await;

		let err = api_for(&server)
			.sync_all_new_events(Utc::now())
			.await
			.unwrap_err();
		assert!(matches!(err, RequestError::Network(NetworkError::Parse(_))));
	}

	#[tokio::test]
	async fn test_send_chat_message_status_failure() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/chat/v1/conversations/sendchatmessage"))
			.and(query_param("alt", "json"))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_string(r#"{"response_header": {"status": "ERROR_INVALID_CONVERSATION"}}"#),
			)
			.expect(1)
			.mount(&server)
			.await;

		let err = api_for(&server)
			.send_chat_message("c1", &[ChatMessageSegment::text("hi")])
			.await
			.unwrap_err();
		assert_eq!(
			err,
			RequestError::Network(NetworkError::ResponseStatus(
				"ERROR_INVALID_CONVERSATION".to_string()
			))
		);

		let bodies = request_bodies(&server).await;
		assert_eq!(bodies[0][5], json!([[[0, "hi", [0, 0, 0, 0], [null]]], []]));
		assert_eq!(bodies[0][7][0], json!(["c1"]));
		assert_eq!(bodies[0][7][2], json!(2));
	}

	#[tokio::test]
	async fn test_set_presence_makes_two_checked_calls() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/chat/v1/presence/setpresence"))
			.respond_with(ResponseTemplate::new(200).set_body_string(OK_BODY))
			.expect(2)
			.mount(&server)
			.await;

		api_for(&server).set_presence(false).await.unwrap();
		let bodies = request_bodies(&server).await;
		assert_eq!(bodies[0][4], json!([true]));
		assert_eq!(bodies[1][1], json!([720, 40]));
	}

	#[tokio::test]
	async fn test_set_active_client_uses_bound_identity() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/chat/v1/clients/setactiveclient"))
			.respond_with(ResponseTemplate::new(200).set_body_string(OK_BODY))
			.expect(1)
			.mount(&server)
			.await;

		let api = api_for(&server);
		api.bind_channel(&ChannelIdentity {
			client_id: "cid".to_string(),
			email: "me@example.com".to_string(),
		});
		api.set_active_client(true).await.unwrap();

		let bodies = request_bodies(&server).await;
		assert_eq!(
			bodies[0],
			json!([
				[[3, 3, "version", "date"], ["cid", "hid"], null, "en"],
				true,
				"me@example.com/cid",
				120
			])
		);
	}

	#[tokio::test]
	async fn test_raw_queries_return_body() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/chat/v1/presence/querypresence"))
			.respond_with(ResponseTemplate::new(200).set_body_string(r#"{"presence_result": []}"#))
			.expect(1)
			.mount(&server)
			.await;

		let value = api_for(&server).query_presence("alice").await.unwrap();
		assert_eq!(value, json!({"presence_result": []}));
		let bodies = request_bodies(&server).await;
		assert_eq!(bodies[0][1], json!([["alice"]]));
	}
}
