//! Session and initial snapshot types produced by the bootstrap

use crate::schema::{ClientConversationState, ClientEntity, ParticipantData, SchemaError};
use crate::transport::NetworkError;
use chrono::{DateTime, Utc};

/// Parameters needed to open the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelParams {
    /// Channel path.
    pub path: String,
    /// Client launch id.
    pub clid: String,
    /// Opaque `ec` parameter.
    pub ec_param: String,
    /// Opaque `prop` parameter.
    pub prop_param: String,
}

/// Identity the push channel assigns to this client once connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    /// Client-instance id sent in every request header.
    pub client_id: String,
    /// Account email, used to name the active client.
    pub email: String,
}

/// Credentials and request parameters for one client session.
///
/// Immutable once built. A connected channel produces a new session through
/// `with_channel_identity`; a fresh bootstrap replaces it entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// API key sent with every RPC call.
    pub api_key: String,
    pub header_date: String,
    pub header_version: String,
    /// Request id sent in every request header.
    pub header_id: String,
    /// Client-instance id, known once the push channel has connected.
    pub client_id: Option<String>,
    /// Account email, known once the push channel has connected.
    pub email: Option<String>,
    pub channel: ChannelParams,
}

impl Session {
    /// Copy of this session bound to a connected channel.
    pub fn with_channel_identity(&self, identity: &ChannelIdentity) -> Session {
        Session {
            client_id: Some(identity.client_id.clone()),
            email: Some(identity.email.clone()),
            ..self.clone()
        }
    }

    /// `"{email}/{client_id}"`, the name under which this client is announced as active.
    pub fn active_client_name(&self) -> String {
        format!(
            "{}/{}",
            self.email.as_deref().unwrap_or_default(),
            self.client_id.as_deref().unwrap_or_default()
        )
    }
}

/// State known at bootstrap time, used once to seed the conversation store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialSnapshot {
    /// Every existing conversation with its events.
    pub conversation_states: Vec<ClientConversationState>,
    /// The caller's own entity.
    pub self_entity: ClientEntity,
    /// Contacts, in page order. May contain duplicates; empty if they could not be decoded.
    pub entities: Vec<ClientEntity>,
    /// Participants of all conversations, flattened.
    pub conversation_participants: Vec<ParticipantData>,
    /// Watermark to start from.
    pub sync_timestamp: DateTime<Utc>,
}

/// Fatal failure while establishing a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("Initialize chat request failed: {0}")]
    Request(#[from] NetworkError),

    #[error("Failed to get initialize chat value: {0}")]
    MissingField(String),

    #[error("Failed to parse {field}: {source}")]
    Schema {
        field: &'static str,
        source: SchemaError,
    },
}
