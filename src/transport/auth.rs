//! Per-request authorization for RPC calls.

use sha1::{Digest, Sha1};

/// Cookie whose value feeds the authorization digest.
pub const SAPISID_COOKIE: &str = "SAPISID";

/// Cookies every RPC call must carry.
pub const REQUIRED_COOKIES: [&str; 5] = ["SAPISID", "HSID", "SSID", "APISID", "SID"];

/// Build the `authorization` header value for a request made at `time_msec`.
///
/// The digest is the hex SHA-1 of `"{time_msec} {sapisid} {origin}"`. It embeds the timestamp,
/// so it is computed for every request.
pub fn authorization_header(sapisid: &str, origin: &str, time_msec: i64) -> String {
	let auth_string = format!("{} {} {}", time_msec, sapisid, origin);
	let digest = Sha1::digest(auth_string.as_bytes());
	format!("SAPISIDHASH {}_{}", time_msec, hex::encode(digest))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_authorization_header_digest() {
		assert_eq!(
			authorization_header("abc", "https://talkgadget.google.com", 1000),
			"SAPISIDHASH 1000_b46c507923fc4be9c14f2d8a408ca3bc62f8eabb"
		);
	}

	#[test]
	fn test_authorization_header_changes_with_time() {
		let origin = "https://talkgadget.google.com";
		assert_ne!(
			authorization_header("abc", origin, 1000),
			authorization_header("abc", origin, 1001)
		);
	}
}
