use std::sync::Arc;

use maelstrom_core::{Result, Server};
use maelstrom_database::Database;
use tracing::{debug, info};

use crate::{
	Args, OnceServices, Service as _,
	federation, globals,
	rooms::{
		create, event_handler, metadata, short, state, state_accessor, state_cache, timeline,
	},
};

/// The assembled service layer.
pub struct Services {
	pub server: Arc<Server>,
	pub db: Arc<Database>,

	pub globals: Arc<globals::Service>,
	pub federation: Arc<federation::Service>,
	pub short: Arc<short::Service>,
	pub metadata: Arc<metadata::Service>,
	pub state: Arc<state::Service>,
	pub state_accessor: Arc<state_accessor::Service>,
	pub state_cache: Arc<state_cache::Service>,
	pub timeline: Arc<timeline::Service>,
	pub event_handler: Arc<event_handler::Service>,
	pub create: Arc<create::Service>,
}

impl Services {
	pub async fn build(server: Arc<Server>, db: Arc<Database>) -> Result<Arc<Self>> {
		let services = OnceServices::new(server.clone(), db.clone());
		let args = Args { server: &server, db: &db, services: &services };

		macro_rules! build {
			($dep:ident, $module:ident) => {{
				let service = $module::Service::build(&args)?;
				debug!("Built {}", service.name());
				services.$dep.set(service.clone());
				service
			}};
		}

		let globals = build!(globals, globals);
		let federation = build!(federation, federation);
		let short = build!(short, short);
		let metadata = build!(metadata, metadata);
		let state = build!(state, state);
		let state_accessor = build!(state_accessor, state_accessor);
		let state_cache = build!(state_cache, state_cache);
		let timeline = build!(timeline, timeline);
		let event_handler = build!(event_handler, event_handler);
		let create = build!(create, create);

		info!(
			server_name = %server.name,
			count = %services.db.iter().count(),
			"Services online."
		);

		Ok(Arc::new(Self {
			server,
			db,
			globals,
			federation,
			short,
			metadata,
			state,
			state_accessor,
			state_cache,
			timeline,
			event_handler,
			create,
		}))
	}
}
