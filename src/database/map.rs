use std::{fmt, sync::Arc};

use maelstrom_core::{Result, err, implement};
use rocksdb::AsColumnFamilyRef;
use tracing::trace;

use crate::{Engine, stream::Items};

/// One named column of the database.
pub struct Map {
	name: &'static str,
	engine: Arc<Engine>,
}

impl Map {
	pub(crate) fn open(engine: &Arc<Engine>, name: &'static str) -> Result<Arc<Self>> {
		engine
			.db
			.cf_handle(name)
			.ok_or_else(|| err!(Database("column family {name:?} was not opened")))?;

		Ok(Arc::new(Self { name, engine: engine.clone() }))
	}

	#[inline]
	#[must_use]
	pub fn name(&self) -> &str { self.name }

	#[inline]
	pub(crate) fn engine(&self) -> &Arc<Engine> { &self.engine }

	pub(crate) fn cf(&self) -> impl AsColumnFamilyRef + '_ {
		self.engine
			.db
			.cf_handle(self.name)
			.expect("column family opened at database load")
	}
}

/// Fetch a value; a missing key is an error to compose with `?` and
/// `.optional()`. May suspend on a storage read miss.
#[implement(Map)]
#[tracing::instrument(level = "trace", skip(self, key), fields(map = self.name))]
pub async fn get<K>(&self, key: K) -> Result<Vec<u8>>
where
	K: AsRef<[u8]>,
{
	tokio::task::yield_now().await;
	self.get_blocking(key)
}

#[implement(Map)]
pub fn get_blocking<K>(&self, key: K) -> Result<Vec<u8>>
where
	K: AsRef<[u8]>,
{
	self.engine
		.db
		.get_pinned_cf_opt(&self.cf(), key.as_ref(), &self.engine.read_options())
		.map_err(|e| err!(Database("get from {}: {e}", self.name)))?
		.map(|val| val.to_vec())
		.ok_or_else(|| err!(NotFound("key not found in {}", self.name)))
}

#[implement(Map)]
pub async fn exists<K>(&self, key: K) -> bool
where
	K: AsRef<[u8]>,
{
	self.get(key).await.is_ok()
}

/// Asynchronous read-ahead hint; the caller does not wait for the result.
#[implement(Map)]
pub fn prefetch<K>(&self, key: K)
where
	K: AsRef<[u8]>,
{
	let engine = self.engine.clone();
	let name = self.name;
	let key = key.as_ref().to_vec();

	tokio::task::spawn_blocking(move || {
		if let Some(cf) = engine.db.cf_handle(name) {
			let _ = engine
				.db
				.get_pinned_cf_opt(&cf, &key, &engine.read_options());
		}
	});
}

/// Direct non-transactional write; used for maintenance and rebuilds.
/// Event commits go through `Database::batch` instead.
#[implement(Map)]
#[tracing::instrument(level = "trace", skip(self, key, value), fields(map = self.name))]
pub fn put<K, V>(&self, key: K, value: V) -> Result
where
	K: AsRef<[u8]>,
	V: AsRef<[u8]>,
{
	self.engine
		.db
		.put_cf_opt(
			&self.cf(),
			key.as_ref(),
			value.as_ref(),
			&self.engine.write_options(),
		)
		.map_err(|e| err!(Database("write to {} failed: {e}", self.name)))
}

#[implement(Map)]
#[tracing::instrument(level = "trace", skip(self, key), fields(map = self.name))]
pub fn del<K>(&self, key: K) -> Result
where
	K: AsRef<[u8]>,
{
	self.engine
		.db
		.delete_cf_opt(&self.cf(), key.as_ref(), &self.engine.write_options())
		.map_err(|e| err!(Database("delete from {} failed: {e}", self.name)))
}

/// Ordered forward iteration over keys sharing a prefix. The iterator
/// borrows the map; do not hold it across a suspension point.
#[implement(Map)]
pub fn iter_prefix(&self, prefix: &[u8]) -> Items<'_> {
	trace!(map = self.name, "fwd prefix scan");
	Items::forward_prefix(self, prefix.to_vec())
}

/// Ordered reverse iteration over keys sharing a prefix.
#[implement(Map)]
pub fn rev_iter_prefix(&self, prefix: &[u8]) -> Items<'_> {
	trace!(map = self.name, "rev prefix scan");
	Items::reverse_prefix(self, prefix.to_vec())
}

/// Forward iteration from `from`, bounded to keys sharing `prefix`.
#[implement(Map)]
pub fn iter_from_prefix(&self, prefix: &[u8], from: &[u8]) -> Items<'_> {
	Items::forward_from_prefix(self, prefix.to_vec(), from.to_vec())
}

/// Reverse iteration from at-or-below `from`, bounded to keys sharing
/// `prefix`.
#[implement(Map)]
pub fn rev_iter_from_prefix(&self, prefix: &[u8], from: &[u8]) -> Items<'_> {
	Items::reverse_from_prefix(self, prefix.to_vec(), from.to_vec())
}

impl fmt::Debug for Map {
	fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(out, "Map {{name: {0}}}", self.name)
	}
}

impl fmt::Display for Map {
	fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result { write!(out, "{0}", self.name) }
}
