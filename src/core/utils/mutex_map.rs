use std::{collections::HashMap, hash::Hash, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of mutexes keyed dynamically; used to serialize commits per room.
/// Entries persist for the life of the map.
pub struct MutexMap<Key, Val> {
	map: Mutex<HashMap<Key, Arc<Mutex<Val>>>>,
}

pub struct MutexMapGuard<Key, Val> {
	_guard: OwnedMutexGuard<Val>,
	_phantom: std::marker::PhantomData<Key>,
}

impl<Key, Val> MutexMap<Key, Val>
where
	Key: Clone + Eq + Hash + Send,
	Val: Default + Send + 'static,
{
	#[must_use]
	pub fn new() -> Self {
		Self { map: Mutex::new(HashMap::new()) }
	}

	#[tracing::instrument(level = "trace", skip(self))]
	pub async fn lock<K>(&self, k: &K) -> MutexMapGuard<Key, Val>
	where
		K: std::fmt::Debug + Send + ?Sized + Sync,
		for<'a> Key: From<&'a K>,
	{
		let val = self
			.map
			.lock()
			.await
			.entry(Key::from(k))
			.or_default()
			.clone();

		MutexMapGuard {
			_guard: val.lock_owned().await,
			_phantom: std::marker::PhantomData,
		}
	}

	pub async fn len(&self) -> usize { self.map.lock().await.len() }

	pub async fn is_empty(&self) -> bool { self.map.lock().await.is_empty() }
}

impl<Key, Val> Default for MutexMap<Key, Val>
where
	Key: Clone + Eq + Hash + Send,
	Val: Default + Send + 'static,
{
	fn default() -> Self { Self::new() }
}
