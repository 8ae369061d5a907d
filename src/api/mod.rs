//! Chat RPC operations on top of the authenticated transport.

mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod requests;
mod service;

pub use client::ChatApi;
pub use service::ChatService;
