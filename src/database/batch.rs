use rocksdb::WriteBatch;

use crate::Map;

/// Staged writes across any number of columns, applied atomically by
/// `Database::commit`. Staging never touches storage; a dropped batch
/// leaves no trace.
#[derive(Default)]
pub struct Batch {
	wb: WriteBatch,
	ops: usize,
}

impl Batch {
	pub(crate) fn new() -> Self { Self::default() }

	pub fn set<K, V>(&mut self, map: &Map, key: K, value: V)
	where
		K: AsRef<[u8]>,
		V: AsRef<[u8]>,
	{
		self.wb.put_cf(&map.cf(), key.as_ref(), value.as_ref());
		self.ops = self.ops.saturating_add(1);
	}

	pub fn del<K>(&mut self, map: &Map, key: K)
	where
		K: AsRef<[u8]>,
	{
		self.wb.delete_cf(&map.cf(), key.as_ref());
		self.ops = self.ops.saturating_add(1);
	}

	#[inline]
	#[must_use]
	pub fn len(&self) -> usize { self.ops }

	#[inline]
	#[must_use]
	pub fn is_empty(&self) -> bool { self.ops == 0 }

	pub(crate) fn into_inner(self) -> WriteBatch { self.wb }
}
