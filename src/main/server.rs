use std::{net::SocketAddr, sync::Arc};

use maelstrom_core::{Result, Server};
use maelstrom_database::Database;
use maelstrom_service::Services;
use tokio::net::TcpListener;
use tracing::info;

pub(crate) async fn run(server: &Arc<Server>) -> Result {
	let db = Database::open(server).await?;
	let services = Services::build(server.clone(), db).await?;

	let app = maelstrom_api::router(services.clone());
	let addr = SocketAddr::new(server.config.address, server.config.port);
	let listener = TcpListener::bind(addr).await?;

	info!(%addr, "listening");

	let shutdown = {
		let server = server.clone();
		async move {
			tokio::select! {
				_ = tokio::signal::ctrl_c() => {
					server.shutdown().ok();
				},
				() = server.until_shutdown() => {},
			}
		}
	};

	let (_listener_ctx, serving) = maelstrom_core::ctx::spawn("listener", async move {
		axum::serve(listener, app)
			.with_graceful_shutdown(shutdown)
			.await
	});

	serving.await??;
	services.db.engine.flush()?;

	info!("shutdown complete");
	Ok(())
}
