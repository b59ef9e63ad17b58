mod logging;
mod server;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use maelstrom_core::{Config, Result, Server};
use tracing::info;

/// Federated Matrix homeserver core.
#[derive(Parser)]
#[command(version, about)]
struct Args {
	/// Path to the configuration file.
	#[arg(short, long)]
	config: Option<PathBuf>,
}

fn main() -> Result {
	let args = Args::parse();
	let config = Config::load(args.config.as_deref())?;

	logging::init(&config)?;

	// The core is single-threaded and cooperative; requests interleave at
	// explicit suspension points only. The store may still use background
	// threads of its own.
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_io()
		.enable_time()
		.build()?;

	info!(
		server_name = %config.server_name,
		database_path = ?config.database_path,
		"starting",
	);

	let server = Arc::new(Server::new(config, Some(runtime.handle().clone())));
	runtime.block_on(server::run(&server))?;

	info!("exit");
	Ok(())
}
