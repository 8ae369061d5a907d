//!
//! Connection lifecycle controller.
//!
//! Drives the client from push channel events. Every connect and reconnect runs strictly in
//! sequence: announce presence, announce the active client, fire the connect (or reconnect)
//! notification, then resync the conversation store. Presence failures are logged and do not
//! stop the sequence. Disconnecting runs the reverse announcements before the client is marked
//! disconnected and `run` is told to stop.

use super::channel::ChannelEvent;
use super::types::ClientError;
use crate::api::{ChatApi, ChatService};
use crate::config::ClientConfig;
use crate::conversation::ConversationList;
use crate::events::{EventBus, SubscriptionId};
use crate::schema::{ChatMessageSegment, StateUpdate};
use crate::session::{Bootstrapper, ChannelIdentity, InitialSnapshot};
use crate::transport::{Cookies, HttpTransport, RequestError};
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

pub struct Client {
	service: Arc<dyn ChatService>,
	conversations: Arc<ConversationList>,
	connected: AtomicBool,
	shutdown: Notify,
	on_connect: EventBus<()>,
	on_reconnect: EventBus<()>,
	on_disconnect: EventBus<()>,
	on_state_update: EventBus<StateUpdate>,
}

impl Client {
	/// Build a client from a service and a bootstrap snapshot, seeding the conversation store.
	pub fn new(service: Arc<dyn ChatService>, snapshot: InitialSnapshot) -> Self {
		let conversations = Arc::new(ConversationList::from_snapshot(service.clone(), snapshot));
		Self {
			service,
			conversations,
			connected: AtomicBool::new(false),
			shutdown: Notify::new(),
			on_connect: EventBus::new(),
			on_reconnect: EventBus::new(),
			on_disconnect: EventBus::new(),
			on_state_update: EventBus::new(),
		}
	}

	/// Establish a session and build a client on it.
	///
	/// # Arguments
	/// * `config` - Endpoints, timeouts and retry budget
	/// * `cookies` - Session cookies
	///
	/// # Errors
	/// Any bootstrap failure. Nothing is seeded in that case.
	pub async fn bootstrap(config: ClientConfig, cookies: Cookies) -> Result<Self, ClientError> {
		let transport = HttpTransport::new(cookies, config)?;
		let (session, snapshot) = Bootstrapper::new(transport.clone()).bootstrap().await?;
		let api = ChatApi::new(transport, session);
		Ok(Self::new(Arc::new(api), snapshot))
	}

	pub fn conversations(&self) -> Arc<ConversationList> {
		self.conversations.clone()
	}

	pub fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	pub fn on_connect<F>(&self, handler: F) -> SubscriptionId
	where
		F: Fn(&()) + Send + Sync + 'static,
	{
		self.on_connect.subscribe(handler)
	}

	pub fn on_reconnect<F>(&self, handler: F) -> SubscriptionId
	where
		F: Fn(&()) + Send + Sync + 'static,
	{
		self.on_reconnect.subscribe(handler)
	}

	pub fn on_disconnect<F>(&self, handler: F) -> SubscriptionId
	where
		F: Fn(&()) + Send + Sync + 'static,
	{
		self.on_disconnect.subscribe(handler)
	}

	/// Subscribe to raw state updates, fired before they are applied to the store.
	pub fn on_state_update<F>(&self, handler: F) -> SubscriptionId
	where
		F: Fn(&StateUpdate) + Send + Sync + 'static,
	{
		self.on_state_update.subscribe(handler)
	}

	/// Consume channel events until the stream ends or `disconnect` is called.
	///
	/// Only a `disconnect` made while `run` is active stops it; an earlier one is not remembered.
	pub async fn run<S>(&self, events: S)
	where
		S: Stream<Item = ChannelEvent>,
	{
		let shutdown = self.shutdown.notified();
		tokio::pin!(events, shutdown);
		shutdown.as_mut().enable();
		loop {
			tokio::select! {
				_ = &mut shutdown => {
					info!("Client disconnected, stopping");
					break;
				}
				event = events.next() => match event {
					Some(event) => self.handle_channel_event(event).await,
					None => {
						info!("Channel closed");
						break;
					}
				}
			}
		}
	}

	/// Handle one channel event to completion.
	pub async fn handle_channel_event(&self, event: ChannelEvent) {
		match event {
			ChannelEvent::Connected(identity) => self.on_connected(identity).await,
			ChannelEvent::Reconnected => {
				info!("Channel reconnected");
				self.announce(true).await;
				self.connected.store(true, Ordering::SeqCst);
				self.on_reconnect.fire(&());
				self.conversations.resync().await;
			}
			ChannelEvent::Disconnected => {
				info!("Channel disconnected");
				self.connected.store(false, Ordering::SeqCst);
				self.on_disconnect.fire(&());
			}
			ChannelEvent::Update(update) => {
				self.on_state_update.fire(&update);
				self.conversations.apply_push(update);
			}
		}
	}

	async fn on_connected(&self, identity: ChannelIdentity) {
		info!("Channel connected as {}", identity.email);
		self.service.bind_channel(&identity);
		self.announce(true).await;
		self.connected.store(true, Ordering::SeqCst);
		self.on_connect.fire(&());
		self.conversations.resync().await;
	}

	/// Announce presence, then the active client. Failures are logged only.
	async fn announce(&self, online: bool) {
		if let Err(e) = self.service.set_presence(online).await {
			warn!("Failed to set presence to {}: {}", online, e);
		}
		if let Err(e) = self.service.set_active_client(online).await {
			warn!("Failed to set active client to {}: {}", online, e);
		}
		debug!("Announced client as {}", if online { "online" } else { "offline" });
	}

	/// Go offline and stop `run`.
	///
	/// Returns `false` without doing anything if the client is not connected.
	pub async fn disconnect(&self) -> bool {
		if !self.is_connected() {
			debug!("Disconnect requested while not connected");
			return false;
		}
		self.announce(false).await;
		self.connected.store(false, Ordering::SeqCst);
		self.on_disconnect.fire(&());
		self.shutdown.notify_waiters();
		true
	}

	/// Send a chat message.
	///
	/// # Errors
	/// The typed failure from the service; the message was not delivered.
	pub async fn send_message(
		&self,
		conversation_id: &str,
		segments: &[ChatMessageSegment],
	) -> Result<(), RequestError> {
		self.conversations
			.send_message(conversation_id, segments)
			.await
	}
}
