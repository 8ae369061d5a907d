//! Decoding of the chat service's loosely-typed payloads.
//!
//! This module turns raw response text into typed records in two steps: the literal decoder
//! produces a nested `serde_json::Value` from the vendor's JavaScript literal format, and the
//! schema layer maps positional arrays onto the record types the client works with.

/// JavaScript literal decoder
pub mod literal;
/// Positional field accessors and the `Schema` trait
pub mod pblite;
/// Typed records
pub mod records;
/// Error and enum types
pub mod types;

pub use literal::{JsLiteralDecoder, LiteralDecoder};
pub use pblite::Schema;
pub use records::*;
pub use types::*;
