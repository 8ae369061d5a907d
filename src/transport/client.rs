//!
//! Retrying HTTP transport for the chat service.
//!
//! Every request is attempted up to `max_attempts` times. Only timeouts and connection
//! failures are retried; a response with any status other than 200 is reported at once.
//! RPC calls additionally carry the session cookies and a freshly computed authorization
//! header. The underlying `reqwest::Client` pools connections and is shared by clones of the
//! transport, so one transport can serve concurrent callers.

use super::auth::{REQUIRED_COOKIES, SAPISID_COOKIE, authorization_header};
use super::types::*;
use crate::config::ClientConfig;
use backoff::{ExponentialBackoff, future::retry_notify};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// A request description, rebuilt into a fresh `reqwest` request on every attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
	pub method: Method,
	pub url: String,
	pub params: Vec<(String, String)>,
	pub headers: Vec<(String, String)>,
	pub body: Option<String>,
}

impl FetchRequest {
	pub fn get(url: impl Into<String>) -> Self {
		Self {
			method: Method::GET,
			url: url.into(),
			params: Vec::new(),
			headers: Vec::new(),
			body: None,
		}
	}

	pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
		Self {
			method: Method::POST,
			url: url.into(),
			params: Vec::new(),
			headers: Vec::new(),
			body: Some(body.into()),
		}
	}

	pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.push((name.into(), value.into()));
		self
	}

	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}
}

/// Authenticated, retrying HTTP transport.
#[derive(Clone)]
pub struct HttpTransport {
	/// The underlying HTTP client (connection pool).
	http_client: Client,
	/// Session cookies supplied by the caller.
	cookies: Cookies,
	config: ClientConfig,
}

impl HttpTransport {
	/// Create a new transport.
	///
	/// # Arguments
	/// * `cookies` - The session cookies. Only RPC calls require the full set.
	/// * `config` - Endpoints, timeouts and retry budget.
	pub fn new(cookies: Cookies, config: ClientConfig) -> Result<Self, NetworkError> {
		let http_client = Client::builder()
			.build()
			.map_err(|e| NetworkError::Client(e.to_string()))?;

		Ok(Self {
			http_client,
			cookies,
			config,
		})
	}

	pub fn cookies(&self) -> &Cookies {
		&self.cookies
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Perform a request, retrying timeouts and connection failures.
	///
	/// # Returns
	/// The response if it arrived with status 200.
	///
	/// # Errors
	/// The last timeout/connection error once the attempts are spent, or
	/// `NetworkError::UnexpectedStatus` immediately for any other status.
	pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
		info!("Request {} {}", request.method, request.url);

		let max_attempts = self.config.max_attempts.max(1);
		let policy = ExponentialBackoff {
			current_interval: self.config.retry_interval,
			initial_interval: self.config.retry_interval,
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		};

		let mut attempt = 0u32;
		let result = retry_notify(
			policy,
			move || {
				attempt += 1;
				let this_attempt = attempt;
				async move {
					match self.attempt(request).await {
						Err(backoff::Error::Transient { err, .. }) if this_attempt >= max_attempts => {
							info!("Request attempt {} failed: {}", this_attempt, err);
							info!("Request failed after {} attempts", max_attempts);
							Err(backoff::Error::permanent(err))
						}
						other => other,
					}
				}
			},
			|err: NetworkError, wait: Duration| {
				info!("Request attempt failed: {}, retrying in {:?}", err, wait);
			},
		)
		.await;

		if result.is_ok() {
			info!("Request successful");
		}
		result
	}

	/// One attempt. Transient errors may be retried, permanent ones may not.
	async fn attempt(
		&self,
		request: &FetchRequest,
	) -> Result<FetchResponse, backoff::Error<NetworkError>> {
		let mut builder = self
			.http_client
			.request(request.method.clone(), &request.url)
			.query(&request.params);
		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = &request.body {
			builder = builder.body(body.clone());
		}

		let response = match timeout(self.config.connect_timeout, builder.send()).await {
			Err(_) => return Err(backoff::Error::transient(NetworkError::Timeout)),
			Ok(Err(e)) if e.is_builder() => {
				return Err(backoff::Error::permanent(NetworkError::Client(e.to_string())));
			}
			Ok(Err(e)) if e.is_timeout() => {
				return Err(backoff::Error::transient(NetworkError::Timeout));
			}
			Ok(Err(e)) => {
				return Err(backoff::Error::transient(NetworkError::Connection(
					e.to_string(),
				)));
			}
			Ok(Ok(response)) => response,
		};

		let status = response.status();
		let body = match timeout(self.config.read_timeout, response.bytes()).await {
			Err(_) => return Err(backoff::Error::transient(NetworkError::Timeout)),
			Ok(Err(e)) => {
				return Err(backoff::Error::transient(NetworkError::Connection(
					e.to_string(),
				)));
			}
			Ok(Ok(body)) => body,
		};

		if status != StatusCode::OK {
			let reason = status.canonical_reason().unwrap_or("").to_string();
			info!("Request returned unexpected status: {} {}", status.as_u16(), reason);
			return Err(backoff::Error::permanent(NetworkError::UnexpectedStatus {
				status: status.as_u16(),
				reason,
			}));
		}

		Ok(FetchResponse {
			status: status.as_u16(),
			body: body.to_vec(),
		})
	}

	/// Build the authorization header for a request made now.
	pub fn authorization_header(&self) -> Result<String, MissingCredentialError> {
		let sapisid = self.cookies.get(SAPISID_COOKIE)?;
		let time_msec = chrono::Utc::now().timestamp_millis();
		Ok(authorization_header(sapisid, &self.config.origin_url, time_msec))
	}

	/// Execute an RPC call against `endpoint`.
	///
	/// # Arguments
	/// * `api_key` - The session's API key.
	/// * `endpoint` - Path relative to the RPC base URL, e.g. `conversations/sendchatmessage`.
	/// * `payload` - The positional request body.
	/// * `use_json` - Ask for a JSON response (`alt=json`) rather than protojson.
	///
	/// # Errors
	/// `RequestError::MissingCredential` before any network activity if a required cookie is
	/// absent, otherwise the `NetworkError` from `fetch`.
	pub async fn execute(
		&self,
		api_key: &str,
		endpoint: &str,
		payload: &Value,
		use_json: bool,
	) -> Result<FetchResponse, RequestError> {
		let cookie_header = self.cookies.header_for(&REQUIRED_COOKIES)?;
		let authorization = self.authorization_header()?;

		let request = FetchRequest::post(
			format!("{}/{}", self.config.api_base_url, endpoint),
			payload.to_string(),
		)
		.with_param("key", api_key)
		.with_param("alt", if use_json { "json" } else { "protojson" })
		.with_header("authorization", authorization)
		.with_header("x-origin", self.config.origin_url.clone())
		.with_header("x-goog-authuser", "0")
		.with_header("content-type", "application/json+protobuf")
		.with_header("cookie", cookie_header);

		debug!("Fetching '{}' with '{}'", request.url, payload);
		let response = self.fetch(&request).await?;
		debug!(
			"Response to request for {} was {}:\n{}",
			endpoint,
			response.status,
			response.text()
		);
		Ok(response)
	}
}
