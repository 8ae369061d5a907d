//! Types for the authenticated HTTP transport

use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Transport-level failure. Also used for application-level status failures reported
/// inside an HTTP 200 response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("Request timed out")]
    Timeout,

    #[error("Request connection error: {0}")]
    Connection(String),

    #[error("Request returned unexpected status: {status}: {reason}")]
    UnexpectedStatus { status: u16, reason: String },

    #[error("Unexpected response status: {0}")]
    ResponseStatus(String),

    #[error("Response failed to parse: {0}")]
    Parse(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// A session cookie required for RPC calls was not provided. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cookie '{0}' is required")]
pub struct MissingCredentialError(pub String);

/// Failure of an authenticated RPC call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    MissingCredential(#[from] MissingCredentialError),
}

/// Raw response of a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Session cookies, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Cookies(BTreeMap<String, String>);

impl Cookies {
    /// Load cookies from a JSON object of `name: value` pairs.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn get(&self, name: &str) -> Result<&str, MissingCredentialError> {
        self.0
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| MissingCredentialError(name.to_string()))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// `Cookie` header value carrying every cookie.
    pub fn header(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .join("; ")
    }

    /// `Cookie` header value carrying exactly `names`, failing on the first missing one.
    pub fn header_for(&self, names: &[&str]) -> Result<String, MissingCredentialError> {
        let pairs = names
            .iter()
            .map(|name| self.get(name).map(|value| format!("{}={}", name, value)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pairs.iter().join("; "))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Cookies {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_for_fails_on_missing_cookie() {
        let cookies: Cookies = [("SAPISID", "a"), ("HSID", "b")].into_iter().collect();
        assert_eq!(cookies.header_for(&["SAPISID", "HSID"]).unwrap(), "SAPISID=a; HSID=b");
        assert_eq!(
            cookies.header_for(&["SAPISID", "SSID", "HSID"]),
            Err(MissingCredentialError("SSID".to_string()))
        );
    }

    #[test]
    fn test_load_from_json() {
        let path = std::env::temp_dir().join(format!("cookies-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"SID": "x", "HSID": "y"}"#).unwrap();
        let cookies = Cookies::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cookies.get("SID"), Ok("x"));
        assert_eq!(cookies.header(), "HSID=y; SID=x");
    }
}
