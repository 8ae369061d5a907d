use crate::schema::{ChatMessageSegment, SyncAllNewEventsResponse};
use crate::session::ChannelIdentity;
use crate::transport::RequestError;
use chrono::{DateTime, Utc};

/// The RPC calls the synchronizer and lifecycle controller depend on.
///
/// `ChatApi` is the production implementation; tests substitute in-memory fakes.
#[async_trait::async_trait]
pub trait ChatService: Send + Sync {
	/// Bind the identity assigned by a newly connected push channel to later requests.
	fn bind_channel(&self, identity: &ChannelIdentity);

	/// Fetch every event since `since`. The application status has already been checked.
	async fn sync_all_new_events(
		&self,
		since: DateTime<Utc>,
	) -> Result<SyncAllNewEventsResponse, RequestError>;

	async fn send_chat_message(
		&self,
		conversation_id: &str,
		segments: &[ChatMessageSegment],
	) -> Result<(), RequestError>;

	/// Announce this client as online or offline.
	async fn set_presence(&self, online: bool) -> Result<(), RequestError>;

	/// Claim or release the active-client slot for this account.
	async fn set_active_client(&self, active: bool) -> Result<(), RequestError>;
}
