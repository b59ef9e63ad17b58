use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch; the clock for origin_server_ts.
#[must_use]
pub fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock is after the unix epoch")
		.as_millis()
		.try_into()
		.expect("unix epoch millis fit in u64")
}
