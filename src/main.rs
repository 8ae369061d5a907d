use chat_state_sync::{Client, ClientConfig, Cookies};
use std::path::PathBuf;
use tracing::{error, info};

/// Environment variable naming the cookie file when no argument is given.
const COOKIES_ENV: &str = "CHAT_COOKIES";

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let mut filter = tracing_subscriber::EnvFilter::from_default_env()
		.add_directive(tracing::Level::INFO.into());
	if let Ok(directive) = "chat_state_sync=debug".parse() {
		filter = filter.add_directive(directive);
	}
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let Some(path) = std::env::args()
		.nth(1)
		.or_else(|| std::env::var(COOKIES_ENV).ok())
		.map(PathBuf::from)
	else {
		error!("Usage: chat-state-sync <cookies.json> (or set {})", COOKIES_ENV);
		return;
	};

	let cookies = match Cookies::load(&path) {
		Ok(cookies) => cookies,
		Err(e) => {
			error!("Failed to load cookies from {}: {}", path.display(), e);
			return;
		}
	};

	info!("Starting chat state sync");
	let client = match Client::bootstrap(ClientConfig::default(), cookies).await {
		Ok(client) => client,
		Err(e) => {
			error!("{}", e);
			return;
		}
	};

	let conversations = client.conversations();
	match conversations.resync().await {
		Some(stats) => info!(
			"Resync applied {} events, added {} conversations",
			stats.events_applied, stats.conversations_added
		),
		None => info!("Resync failed, showing bootstrap state"),
	}

	for conversation in conversations.get_all() {
		let name = conversation.name().map(str::to_string).unwrap_or_else(|| {
			conversation
				.users()
				.iter()
				.filter(|user| !user.is_self)
				.map(|user| user.first_name.clone())
				.collect::<Vec<_>>()
				.join(", ")
		});
		info!(
			"{} [{}, {:?}]: {} events, last modified {}",
			name,
			conversation.id(),
			conversation.conversation_type(),
			conversation.events().len(),
			conversation
				.last_modified()
				.map(|t| t.to_rfc3339())
				.unwrap_or_else(|| "never".to_string())
		);
	}
	info!(
		"Synced {} conversations up to {}",
		conversations.len(),
		conversations.watermark()
	);
}
