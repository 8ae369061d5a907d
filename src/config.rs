//! Client configuration: service endpoints, timeouts and the retry budget.

use std::time::Duration;

/// Origin the chat service expects requests to come from.
pub const ORIGIN_URL: &str = "https://talkgadget.google.com";
/// Page that carries the session bootstrap data.
pub const CHAT_INIT_URL: &str = "https://talkgadget.google.com/u/0/talkgadget/_/chat";
/// Base URL of the RPC endpoints.
pub const API_BASE_URL: &str = "https://clients6.google.com/chat/v1";
/// Fixed query parameters of the bootstrap request.
pub const CHAT_INIT_PARAMS: [(&str, &str); 3] = [
	("prop", "aChromeExtension"),
	("fid", "gtn-roster-iframe-id"),
	("ec", "[\"ci:ec\",true,true,false]"),
];

/// Default connect timeout (time until response headers arrive).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default read timeout (time to read the response body).
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Total attempts for a request failing with timeouts or connection errors.
pub const MAX_ATTEMPTS: u32 = 3;

/// Configuration for a chat client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Origin used in the authorization digest and `x-origin` header.
	pub origin_url: String,
	/// Bootstrap page URL.
	pub chat_init_url: String,
	/// Query parameters sent with the bootstrap request.
	pub chat_init_params: Vec<(String, String)>,
	/// RPC base URL; endpoints are appended after a `/`.
	pub api_base_url: String,
	pub connect_timeout: Duration,
	pub read_timeout: Duration,
	/// Attempts per request, including the first.
	pub max_attempts: u32,
	/// Initial wait between attempts. Grows exponentially.
	pub retry_interval: Duration,
	/// Language sent in the request header.
	pub language: String,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			origin_url: ORIGIN_URL.to_string(),
			chat_init_url: CHAT_INIT_URL.to_string(),
			chat_init_params: CHAT_INIT_PARAMS
				.iter()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect(),
			api_base_url: API_BASE_URL.to_string(),
			connect_timeout: CONNECT_TIMEOUT,
			read_timeout: READ_TIMEOUT,
			max_attempts: MAX_ATTEMPTS,
			retry_interval: Duration::from_millis(500),
			language: "en".to_string(),
		}
	}
}

impl ClientConfig {
	pub fn with_origin_url(mut self, origin_url: impl Into<String>) -> Self {
		self.origin_url = origin_url.into();
		self
	}

	pub fn with_chat_init_url(mut self, chat_init_url: impl Into<String>) -> Self {
		self.chat_init_url = chat_init_url.into();
		self
	}

	pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
		self.api_base_url = api_base_url.into();
		self
	}

	pub fn with_timeouts(mut self, connect_timeout: Duration, read_timeout: Duration) -> Self {
		self.connect_timeout = connect_timeout;
		self.read_timeout = read_timeout;
		self
	}

	pub fn with_retry(mut self, max_attempts: u32, retry_interval: Duration) -> Self {
		self.max_attempts = max_attempts;
		self.retry_interval = retry_interval;
		self
	}
}
