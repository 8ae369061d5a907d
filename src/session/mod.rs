//! Session establishment: bootstrap page parsing and the resulting credentials.

mod bootstrap;
mod types;

pub use bootstrap::{Bootstrapper, extract_segments, parse_document};
pub use types::*;

#[cfg(test)]
pub(crate) use bootstrap::fixtures;
