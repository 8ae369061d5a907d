//! Authenticated HTTP transport for the chat service.
//!
//! This module provides the retrying request executor, the per-request authorization header,
//! and the cookie and error types shared by everything that talks to the network.

/// Authorization header computation
pub mod auth;
/// Retrying HTTP client
mod client;
/// Cookie, response and error types
mod types;

pub use auth::REQUIRED_COOKIES;
pub use client::{FetchRequest, HttpTransport};
pub use types::*;
