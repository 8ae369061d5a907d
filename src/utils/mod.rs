//!
//! Utility module for the chat client.
//!
//! Re-exports timestamp conversion helpers used throughout the codebase.
/// Server timestamp conversion
pub mod timestamp;

pub use timestamp::{from_timestamp, to_sync_parameter};
