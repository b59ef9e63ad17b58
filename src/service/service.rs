use std::{
	ops::Deref,
	sync::{Arc, OnceLock},
};

use maelstrom_core::{Result, Server};
use maelstrom_database::Database;

/// A unit of the service layer.
pub(crate) trait Service: Send + Sync {
	fn build(args: &Args<'_>) -> Result<Arc<Self>>
	where
		Self: Sized;

	fn name(&self) -> &str;
}

/// Inputs available while a service is being built.
pub(crate) struct Args<'a> {
	pub(crate) server: &'a Arc<Server>,
	pub(crate) db: &'a Arc<Database>,
	pub(crate) services: &'a Arc<OnceServices>,
}

/// Late-bound reference to a sibling service. Services hold the shared
/// `OnceServices` and reach each other through these cells, which are
/// filled in build order before any request runs.
pub(crate) struct Dep<T> {
	dep: OnceLock<Arc<T>>,
}

impl<T> Dep<T> {
	const fn new() -> Self {
		Self { dep: OnceLock::new() }
	}

	pub(crate) fn set(&self, service: Arc<T>) {
		self.dep
			.set(service)
			.unwrap_or_else(|_| panic!("service dependency already initialized"));
	}
}

impl<T> Deref for Dep<T> {
	type Target = T;

	fn deref(&self) -> &T {
		self.dep
			.get()
			.expect("service initialized before first use")
	}
}

/// The service graph as each service sees it.
pub(crate) struct OnceServices {
	pub(crate) server: Arc<Server>,
	pub(crate) db: Arc<Database>,
	pub(crate) globals: Dep<crate::globals::Service>,
	pub(crate) federation: Dep<crate::federation::Service>,
	pub(crate) short: Dep<crate::rooms::short::Service>,
	pub(crate) metadata: Dep<crate::rooms::metadata::Service>,
	pub(crate) state: Dep<crate::rooms::state::Service>,
	pub(crate) state_accessor: Dep<crate::rooms::state_accessor::Service>,
	pub(crate) state_cache: Dep<crate::rooms::state_cache::Service>,
	pub(crate) timeline: Dep<crate::rooms::timeline::Service>,
	pub(crate) event_handler: Dep<crate::rooms::event_handler::Service>,
	pub(crate) create: Dep<crate::rooms::create::Service>,
}

impl OnceServices {
	pub(crate) fn new(server: Arc<Server>, db: Arc<Database>) -> Arc<Self> {
		Arc::new(Self {
			server,
			db,
			globals: Dep::new(),
			federation: Dep::new(),
			short: Dep::new(),
			metadata: Dep::new(),
			state: Dep::new(),
			state_accessor: Dep::new(),
			state_cache: Dep::new(),
			timeline: Dep::new(),
			event_handler: Dep::new(),
			create: Dep::new(),
		})
	}
}

pub(crate) fn make_name(module_path: &str) -> &str {
	module_path
		.rsplit("::")
		.next()
		.expect("module path is non-empty")
}
