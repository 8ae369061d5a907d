//! Errors surfaced by the client lifecycle

use crate::session::BootstrapError;
use crate::transport::{NetworkError, RequestError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to establish session: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}
