use maelstrom_core::{Result, err};
use rocksdb::DBRawIteratorWithThreadMode;

use crate::{Map, engine::Db, keyval::KeyVal};

type Inner<'a> = DBRawIteratorWithThreadMode<'a, Db>;

enum Direction {
	Forward,
	Reverse,
}

/// Cursor over one column yielding owned key/value pairs in order. The
/// cursor is snapshot-consistent for its lifetime but borrows the map, so
/// it must not be held across a suspension point.
pub struct Items<'a> {
	inner: Inner<'a>,
	dir: Direction,
	prefix: Option<Vec<u8>>,
	init: Option<Vec<u8>>,
	done: bool,
}

impl<'a> Items<'a> {
	pub(crate) fn forward_prefix(map: &'a Map, prefix: Vec<u8>) -> Self {
		Self::new(map, Direction::Forward, Some(prefix.clone()), prefix)
	}

	pub(crate) fn reverse_prefix(map: &'a Map, prefix: Vec<u8>) -> Self {
		// The reverse scan starts just past the last possible key with this
		// prefix; 0xFF-append forms an upper bound because the prefix's own
		// final byte is the separator.
		let mut from = prefix.clone();
		from.push(0xFF);
		Self {
			prefix: Some(prefix),
			..Self::new(map, Direction::Reverse, None, from)
		}
	}

	/// Forward from `from`, stopping when keys leave `prefix`.
	pub(crate) fn forward_from_prefix(map: &'a Map, prefix: Vec<u8>, from: Vec<u8>) -> Self {
		Self {
			prefix: Some(prefix),
			..Self::new(map, Direction::Forward, None, from)
		}
	}

	/// Reverse from the greatest key at or below `from`, stopping when keys
	/// leave `prefix`.
	pub(crate) fn reverse_from_prefix(map: &'a Map, prefix: Vec<u8>, from: Vec<u8>) -> Self {
		Self {
			prefix: Some(prefix),
			..Self::new(map, Direction::Reverse, None, from)
		}
	}

	fn new(map: &'a Map, dir: Direction, prefix: Option<Vec<u8>>, from: Vec<u8>) -> Self {
		let inner = map
			.engine()
			.db
			.raw_iterator_cf_opt(&map.cf(), map.engine().read_options());

		Self { inner, dir, prefix, init: Some(from), done: false }
	}

	fn seek(&mut self) {
		let Some(from) = self.init.take() else {
			match self.dir {
				| Direction::Forward => self.inner.next(),
				| Direction::Reverse => self.inner.prev(),
			}
			return;
		};

		if from.is_empty() {
			match self.dir {
				| Direction::Forward => self.inner.seek_to_first(),
				| Direction::Reverse => self.inner.seek_to_last(),
			}
			return;
		}

		match self.dir {
			| Direction::Forward => self.inner.seek(&from),
			| Direction::Reverse => self.inner.seek_for_prev(&from),
		}
	}

	fn fetch(&self) -> Option<KeyVal> {
		let (key, val) = self.inner.item()?;

		if let Some(prefix) = &self.prefix {
			if !key.starts_with(prefix) {
				return None;
			}
		}

		Some((key.to_vec(), val.to_vec()))
	}
}

impl Iterator for Items<'_> {
	type Item = Result<KeyVal>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}

		self.seek();

		if let Some(item) = self.fetch() {
			return Some(Ok(item));
		}

		self.done = true;
		self.inner
			.status()
			.err()
			.map(|e| Err(err!(Database("column scan failed: {e}"))))
	}
}
