//!
//! Session bootstrap from the chat service's initialization page.
//!
//! The page is an HTML document with a series of `AF_initDataCallback(...)` script tags, each
//! carrying one data segment tagged with a namespace key such as `ds:7`. Segments are decoded
//! independently; the ones that fail to decode are skipped, since only a handful are needed.
//! Required values are then read from fixed positions inside specific namespaces.

use super::types::*;
use crate::schema::pblite::{field, to_text, to_u64};
use crate::schema::{
	ClientConversationState, InitialEntities, JsLiteralDecoder, LiteralDecoder, Schema,
	SelfInfoResponse,
};
use crate::transport::{FetchRequest, HttpTransport};
use crate::utils::from_timestamp;
use itertools::Itertools;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static CHAT_INIT_RE: LazyLock<Regex> = LazyLock::new(|| {
	match Regex::new(r"(?s)<script>AF_initDataCallback\((.*?)\);</script>") {
		Ok(re) => re,
		Err(_) => unreachable!("static regex pattern"),
	}
});

/// Fetches the initialization page and turns it into a `Session` and `InitialSnapshot`.
pub struct Bootstrapper {
	transport: HttpTransport,
	decoder: Box<dyn LiteralDecoder>,
}

impl Bootstrapper {
	pub fn new(transport: HttpTransport) -> Self {
		Self {
			transport,
			decoder: Box::new(JsLiteralDecoder),
		}
	}

	/// Request the initialization page and extract the session from it.
	///
	/// # Errors
	/// `BootstrapError::Request` if the page could not be fetched, otherwise any error from
	/// `parse_document`.
	pub async fn bootstrap(&self) -> Result<(Session, InitialSnapshot), BootstrapError> {
		let config = self.transport.config();
		let mut request = FetchRequest::get(config.chat_init_url.clone());
		for (name, value) in &config.chat_init_params {
			request = request.with_param(name.clone(), value.clone());
		}
		let cookies = self.transport.cookies();
		if !cookies.is_empty() {
			request = request.with_header("cookie", cookies.header());
		}

		let response = self.transport.fetch(&request).await?;
		parse_document(&response.text(), self.decoder.as_ref())
	}
}

/// Decode every embedded data segment, keyed by namespace. Undecodable segments are skipped.
pub fn extract_segments(document: &str, decoder: &dyn LiteralDecoder) -> HashMap<String, Value> {
	let mut segments = HashMap::new();
	for capture in CHAT_INIT_RE.captures_iter(document) {
		let Some(text) = capture.get(1).map(|m| m.as_str()) else {
			continue;
		};
		match decoder.decode(text) {
			Ok(mut value) => {
				let key = value.get("key").and_then(Value::as_str).map(str::to_string);
				match (key, value.get_mut("data").map(Value::take)) {
					(Some(key), Some(data)) => {
						segments.insert(key, data);
					}
					_ => debug!("Initialize chat object has no key or data, skipping"),
				}
			}
			Err(e) => {
				debug!("Failed to parse initialize chat object: {}\n{}", e, text);
			}
		}
	}
	segments
}

/// Positions of the required values inside the decoded segments.
mod paths {
	pub const API_KEY: (&str, &[usize]) = ("ds:7", &[0, 2]);
	pub const HEADER_DATE: (&str, &[usize]) = ("ds:2", &[0, 4]);
	pub const HEADER_VERSION: (&str, &[usize]) = ("ds:2", &[0, 6]);
	pub const HEADER_ID: (&str, &[usize]) = ("ds:4", &[0, 7]);
	pub const CHANNEL_PATH: (&str, &[usize]) = ("ds:4", &[0, 1]);
	pub const CLID: (&str, &[usize]) = ("ds:4", &[0, 7]);
	pub const CHANNEL_EC_PARAM: (&str, &[usize]) = ("ds:4", &[0, 4]);
	pub const CHANNEL_PROP_PARAM: (&str, &[usize]) = ("ds:4", &[0, 5]);
	pub const SYNC_TIMESTAMP: (&str, &[usize]) = ("ds:21", &[0, 1, 4]);
	pub const SELF_INFO: (&str, &[usize]) = ("ds:20", &[0]);
	pub const CONVERSATION_STATES: (&str, &[usize]) = ("ds:19", &[0, 3]);
	pub const ENTITIES: (&str, &[usize]) = ("ds:21", &[0]);
}

fn describe((key, path): (&str, &[usize])) -> String {
	format!("{}{}", key, path.iter().map(|i| format!("[{}]", i)).join(""))
}

fn lookup<'a>(
	segments: &'a HashMap<String, Value>,
	location: (&str, &[usize]),
) -> Result<&'a Value, BootstrapError> {
	let (key, path) = location;
	let missing = || BootstrapError::MissingField(describe(location));
	let mut value = segments.get(key).ok_or_else(missing)?;
	for index in path {
		value = field(value, *index).ok_or_else(missing)?;
	}
	Ok(value)
}

fn lookup_text(
	segments: &HashMap<String, Value>,
	location: (&str, &[usize]),
) -> Result<String, BootstrapError> {
	to_text(lookup(segments, location)?).ok_or_else(|| BootstrapError::MissingField(describe(location)))
}

/// Build the session and initial snapshot from an initialization page.
///
/// # Errors
/// `BootstrapError::MissingField` naming the first required namespace/position that is absent,
/// or `BootstrapError::Schema` if the self entity or conversation list cannot be decoded.
/// A contact list that cannot be decoded only produces a warning and an empty entity set.
pub fn parse_document(
	document: &str,
	decoder: &dyn LiteralDecoder,
) -> Result<(Session, InitialSnapshot), BootstrapError> {
	let segments = extract_segments(document, decoder);
	debug!(
		"Decoded initialize chat segments: {}",
		segments.keys().sorted().join(", ")
	);

	let session = Session {
		api_key: lookup_text(&segments, paths::API_KEY)?,
		header_date: lookup_text(&segments, paths::HEADER_DATE)?,
		header_version: lookup_text(&segments, paths::HEADER_VERSION)?,
		header_id: lookup_text(&segments, paths::HEADER_ID)?,
		client_id: None,
		email: None,
		channel: ChannelParams {
			path: lookup_text(&segments, paths::CHANNEL_PATH)?,
			clid: lookup_text(&segments, paths::CLID)?,
			ec_param: lookup_text(&segments, paths::CHANNEL_EC_PARAM)?,
			prop_param: lookup_text(&segments, paths::CHANNEL_PROP_PARAM)?,
		},
	};
	let sync_timestamp = to_u64(lookup(&segments, paths::SYNC_TIMESTAMP)?)
		.map(from_timestamp)
		.ok_or_else(|| BootstrapError::MissingField(describe(paths::SYNC_TIMESTAMP)))?;

	let self_entity = SelfInfoResponse::parse(lookup(&segments, paths::SELF_INFO)?)
		.map_err(|source| BootstrapError::Schema {
			field: "self entity",
			source,
		})?
		.self_entity;

	let conversation_states =
		Vec::<ClientConversationState>::parse(lookup(&segments, paths::CONVERSATION_STATES)?)
			.map_err(|source| BootstrapError::Schema {
				field: "conversation states",
				source,
			})?;
	let conversation_participants = conversation_states
		.iter()
		.flat_map(|state| state.conversation.participant_data.iter().cloned())
		.collect();

	let entities = match lookup(&segments, paths::ENTITIES)
		.map_err(|e| e.to_string())
		.and_then(|value| InitialEntities::parse(value).map_err(|e| e.to_string()))
	{
		Ok(entities) => entities.flatten(),
		Err(e) => {
			warn!("Failed to parse initial client entities: {}", e);
			Vec::new()
		}
	};

	info!(
		"Initialized session with {} conversations and {} entities",
		conversation_states.len(),
		entities.len()
	);

	Ok((
		session,
		InitialSnapshot {
			conversation_states,
			self_entity,
			entities,
			conversation_participants,
			sync_timestamp,
		},
	))
}
