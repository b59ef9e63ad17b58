use maelstrom_core::{Config, Result, err};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub(crate) fn init(config: &Config) -> Result {
	let filter = EnvFilter::builder()
		.parse(&config.log)
		.map_err(|e| err!(Config("log", "{e}.")))?;

	tracing_subscriber::registry()
		.with(fmt::layer())
		.with(filter)
		.try_init()
		.map_err(|e| err!("logging already initialized: {e}"))?;

	Ok(())
}
