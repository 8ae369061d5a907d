use chrono::{DateTime, Utc};

/// Convert a server timestamp (microseconds since the epoch) to a `DateTime`.
///
/// Out-of-range values clamp to the epoch.
pub fn from_timestamp(microseconds: u64) -> DateTime<Utc> {
	i64::try_from(microseconds)
		.ok()
		.and_then(DateTime::from_timestamp_micros)
		.unwrap_or(DateTime::UNIX_EPOCH)
}

/// Microsecond value sent as a sync-since parameter: whole seconds, scaled back up.
pub fn to_sync_parameter(datetime: DateTime<Utc>) -> i64 {
	datetime.timestamp() * 1_000_000
}
