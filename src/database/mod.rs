mod batch;
mod engine;
pub mod keyval;
mod map;
pub mod maps;
mod stream;
#[cfg(test)]
mod tests;

use std::{ops::Index, sync::Arc};

use maelstrom_core::{Result, Server, err};

pub use self::{
	batch::Batch,
	keyval::{KeyVal, SEP, key2, key3, prefix, push_u64, split2, split3, split_u64_tail, trim_sep},
	map::Map,
	stream::Items,
};
pub(crate) use self::engine::Engine;
use crate::maps::Maps;

pub struct Database {
	maps: Maps,
	pub engine: Arc<Engine>,
}

impl Database {
	/// Load an existing database or create a new one.
	pub async fn open(server: &Arc<Server>) -> Result<Arc<Self>> {
		let engine = Engine::open(server, maps::MAPS)?;
		Ok(Arc::new(Self { maps: maps::open(&engine)?, engine }))
	}

	#[inline]
	pub fn get(&self, name: &str) -> Result<&Arc<Map>> {
		self.maps
			.get(name)
			.ok_or_else(|| err!(NotFound("column {name:?} not found")))
	}

	/// Begin staging an atomic multi-column write.
	#[inline]
	#[must_use]
	pub fn batch(&self) -> Batch { Batch::new() }

	/// Apply a staged batch. All of it becomes durable or none of it does;
	/// the call may suspend awaiting the write-ahead log.
	#[tracing::instrument(level = "trace", skip_all, fields(ops = batch.len()))]
	pub async fn commit(&self, batch: Batch) -> Result {
		self.engine.write(batch.into_inner())
	}

	#[inline]
	pub fn iter(&self) -> impl Iterator<Item = (&&'static str, &Arc<Map>)> + Send + '_ {
		self.maps.iter()
	}

	#[inline]
	#[must_use]
	pub fn is_read_only(&self) -> bool { self.engine.is_read_only() }
}

impl Index<&str> for Database {
	type Output = Arc<Map>;

	fn index(&self, name: &str) -> &Self::Output {
		self.maps
			.get(name)
			.expect("column in database does not exist")
	}
}
