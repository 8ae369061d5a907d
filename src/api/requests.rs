//! Positional request bodies for the chat RPC endpoints.
//!
//! Every body starts with the shared request header. Shapes are fixed by the service; `null`
//! placeholders must stay where they are.

use crate::schema::ChatMessageSegment;
use crate::session::Session;
use crate::transport::NetworkError;
use crate::utils::to_sync_parameter;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

pub const SYNC_ALL_NEW_EVENTS: &str = "conversations/syncallnewevents";
pub const SEND_CHAT_MESSAGE: &str = "conversations/sendchatmessage";
pub const SET_PRESENCE: &str = "presence/setpresence";
pub const QUERY_PRESENCE: &str = "presence/querypresence";
pub const SET_ACTIVE_CLIENT: &str = "clients/setactiveclient";
pub const SET_FOCUS: &str = "conversations/setfocus";
pub const RENAME_CONVERSATION: &str = "conversations/renameconversation";
pub const EASTER_EGG: &str = "conversations/easteregg";
pub const GET_CONVERSATION: &str = "conversations/getconversation";
pub const SYNC_RECENT_CONVERSATIONS: &str = "conversations/syncrecentconversations";
pub const GET_SELF_INFO: &str = "contacts/getselfinfo";
pub const SEARCH_ENTITIES: &str = "contacts/searchentities";
pub const GET_ENTITY_BY_ID: &str = "contacts/getentitybyid";

/// Largest response the full sync may return, in bytes.
pub const MAX_RESPONSE_SIZE_BYTES: u64 = 1_048_576;
/// Seconds an active-client claim stays valid.
pub const ACTIVE_CLIENT_TIMEOUT_SECS: u64 = 120;
/// Seconds a client-presence claim stays valid.
pub const CLIENT_PRESENCE_TIMEOUT_SECS: u64 = 720;

/// `[[3, 3, version, date], [client_id, header_id], null, language]`
pub fn request_header(session: &Session, language: &str) -> Value {
	json!([
		[3, 3, session.header_version, session.header_date],
		[session.client_id, session.header_id],
		null,
		language
	])
}

pub fn sync_all_new_events(header: Value, since: DateTime<Utc>) -> Value {
	json!([
		header,
		to_sync_parameter(since),
		[],
		null,
		[],
		false,
		[],
		MAX_RESPONSE_SIZE_BYTES
	])
}

pub fn send_chat_message(
	header: Value,
	conversation_id: &str,
	segments: &[ChatMessageSegment],
	client_generated_id: u32,
) -> Value {
	let segments: Vec<Value> = segments.iter().map(ChatMessageSegment::serialize).collect();
	json!([
		header,
		null,
		null,
		null,
		[],
		[segments, []],
		null,
		[[conversation_id], client_generated_id, 2],
		null,
		null,
		null,
		[]
	])
}

/// First half of a presence change: the presence state itself.
pub fn set_presence_state(header: Value, online: bool) -> Value {
	json!([header, null, null, null, [!online]])
}

/// Second half of a presence change: the client presence level.
pub fn set_client_presence(header: Value, online: bool) -> Value {
	json!([header, [CLIENT_PRESENCE_TIMEOUT_SECS, if online { 1 } else { 40 }]])
}

pub fn set_mood(header: Value, mood: &str) -> Value {
	json!([header, null, null, null, null, [mood]])
}

pub fn set_active_client(header: Value, active: bool, client_name: &str) -> Value {
	json!([header, active, client_name, ACTIVE_CLIENT_TIMEOUT_SECS])
}

pub fn set_focus(header: Value, conversation_id: &str) -> Value {
	json!([header, [conversation_id], 1, 20])
}

pub fn rename_conversation(
	header: Value,
	conversation_id: &str,
	name: &str,
	client_generated_id: u32,
) -> Value {
	json!([header, null, name, null, [[conversation_id], client_generated_id, 1]])
}

pub fn easter_egg(header: Value, conversation_id: &str, egg: &str) -> Value {
	json!([header, [conversation_id], [egg, null, 1]])
}

pub fn get_self_info(header: Value) -> Value {
	json!([header, [], []])
}

pub fn search_entities(header: Value, query: &str, max_results: u32) -> Value {
	json!([header, [], query, max_results])
}

pub fn query_presence(header: Value, chat_id: &str) -> Value {
	json!([header, [[chat_id]], [1, 2, 5, 7, 8]])
}

pub fn get_entity_by_id(header: Value, chat_ids: &[&str]) -> Value {
	let ids: Vec<Value> = chat_ids.iter().map(|id| json!([id])).collect();
	json!([header, null, ids])
}

pub fn get_conversation(
	header: Value,
	conversation_id: &str,
	num_events: u32,
	continuation_token: Option<&str>,
	event_timestamp: Option<u64>,
) -> Value {
	json!([
		header,
		[[conversation_id], [], []],
		true,
		true,
		null,
		num_events,
		[null, continuation_token, event_timestamp]
	])
}

pub fn sync_recent_conversations(header: Value) -> Value {
	json!([header])
}

/// Decode a JSON response and require `response_header.status == "OK"`.
///
/// # Errors
/// `NetworkError::Parse` if the body is not JSON, `NetworkError::ResponseStatus` carrying the
/// reported status otherwise.
pub fn check_json_status(body: &[u8]) -> Result<Value, NetworkError> {
	let value: Value =
		serde_json::from_slice(body).map_err(|e| NetworkError::Parse(e.to_string()))?;
	match value.pointer("/response_header/status").and_then(Value::as_str) {
		Some("OK") => Ok(value),
		Some(status) => Err(NetworkError::ResponseStatus(status.to_string())),
		None => Err(NetworkError::ResponseStatus("missing".to_string())),
	}
}

/// Decode a JSON response without checking its status.
pub fn parse_json(body: &[u8]) -> Result<Value, NetworkError> {
	serde_json::from_slice(body).map_err(|e| NetworkError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::session::ChannelParams;
	use crate::utils::from_timestamp;

	fn session() -> Session {
		Session {
			api_key: "key".to_string(),
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

	#[test]
	fn test_request_header_before_and_after_channel_binding() {
		let session = session();
		assert_eq!(
			request_header(&session, "en"),
			json!([[3, 3, "version", "date"], [null, "hid"], null, "en"])
		);

		let bound = session.with_channel_identity(&crate::session::ChannelIdentity {
			client_id: "cid".to_string(),
			email: "me@example.com".to_string(),
		});
		assert_eq!(
			request_header(&bound, "en"),
			json!([[3, 3, "version", "date"], ["cid", "hid"], null, "en"])
		);
	}

	#[test]
	fn test_sync_all_new_events_truncates_to_seconds() {
		let body = sync_all_new_events(json!("h"), from_timestamp(1_400_000_000_123_456));
		assert_eq!(
			body,
			json!(["h", 1_400_000_000_000_000i64, [], null, [], false, [], 1_048_576])
		);
	}

	#[test]
	fn test_send_chat_message_layout() {
		let body = send_chat_message(
			json!("h"),
			"c1",
			&[ChatMessageSegment::text("hi"), ChatMessageSegment::line_break()],
			7,
		);
		assert_eq!(
			body,
			json!([
				"h",
				null,
				null,
				null,
				[],
				[[[0, "hi", [0, 0, 0, 0], [null]], [1, "\n", [0, 0, 0, 0], [null]]], []],
				null,
				[["c1"], 7, 2],
				null,
				null,
				null,
				[]
			])
		);
	}

	#[test]
	fn test_presence_bodies() {
		assert_eq!(set_presence_state(json!("h"), true), json!(["h", null, null, null, [false]]));
		assert_eq!(set_client_presence(json!("h"), true), json!(["h", [720, 1]]));
		assert_eq!(set_client_presence(json!("h"), false), json!(["h", [720, 40]]));
		assert_eq!(
			set_active_client(json!("h"), true, "me@example.com/cid"),
			json!(["h", true, "me@example.com/cid", 120])
		);
	}

	#[test]
	fn test_check_json_status() {
		assert!(check_json_status(br#"{"response_header": {"status": "OK"}}"#).is_ok());
		assert_eq!(
			check_json_status(br#"{"response_header": {"status": "ERROR_INVALID_REQUEST"}}"#),
			Err(NetworkError::ResponseStatus("ERROR_INVALID_REQUEST".to_string()))
		);
		assert!(matches!(check_json_status(b"<html>"), Err(NetworkError::Parse(_))));
	}
}
