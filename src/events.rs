//! Typed publish/subscribe.
//!
//! An `EventBus<T>` holds handlers for one kind of notification. `fire` calls every handler in
//! subscription order on the calling task. Dispatch works on a snapshot of the handler list
//! taken when `fire` starts: a handler subscribed or removed while a dispatch is running takes
//! effect from the next `fire`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct EventBus<T> {
	handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
	next_id: AtomicU64,
}

impl<T> Default for EventBus<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> EventBus<T> {
	pub fn new() -> Self {
		Self {
			handlers: Mutex::new(Vec::new()),
			next_id: AtomicU64::new(0),
		}
	}

	/// Register a handler. Handlers are called in the order they are registered.
	pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
	where
		F: Fn(&T) + Send + Sync + 'static,
	{
		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let handler: Handler<T> = Arc::new(handler);
		self.handlers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push((id, handler));
		id
	}

	/// Remove a handler. Returns whether it was registered.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
		let before = handlers.len();
		handlers.retain(|(handler_id, _)| *handler_id != id);
		handlers.len() != before
	}

	/// Call every handler with `event`.
	pub fn fire(&self, event: &T) {
		let snapshot: Vec<Handler<T>> = self
			.handlers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.map(|(_, handler)| handler.clone())
			.collect();
		for handler in snapshot {
			handler(event);
		}
	}

	pub fn len(&self) -> usize {
		self.handlers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
