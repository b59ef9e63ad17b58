use std::sync::{
	Arc, RwLock,
	atomic::{AtomicU64, Ordering},
};

use maelstrom_core::{Result, Server, err, implement, utils};
use maelstrom_database::Map;
use ruma::{
	CanonicalJsonObject, RoomVersionId, ServerName, UserId,
	serde::Base64,
	signatures::{Ed25519KeyPair, PublicKeyMap},
};

use crate::service;

pub struct Service {
	server: Arc<Server>,
	db: Data,

	/// Last minted event index; the dense counter all secondary columns
	/// key on. Persisted inside every commit batch which mints.
	counter: AtomicU64,

	keypair: Ed25519KeyPair,

	/// Verification keys trusted for signature checks, ours included.
	/// Remote keys are deposited here by the key-fetching collaborator.
	verify_keys: RwLock<PublicKeyMap>,
}

struct Data {
	global: Arc<Map>,
}

const COUNTER: &[u8] = b"counter";
const KEYPAIR: &[u8] = b"keypair";
const KEY_VERSION: &str = "1";

impl crate::Service for Service {
	fn build(args: &crate::Args<'_>) -> Result<Arc<Self>> {
		let global = args.db["global"].clone();

		let counter = global
			.get_blocking(COUNTER)
			.ok()
			.as_deref()
			.map(utils::checked_u64_from_u8)
			.transpose()?
			.unwrap_or(0);

		let keypair = load_keypair(&global)?;

		let service = Self {
			server: args.server.clone(),
			db: Data { global },
			counter: AtomicU64::new(counter),
			keypair,
			verify_keys: RwLock::new(PublicKeyMap::new()),
		};

		service.add_verify_key(
			args.server.name.as_str(),
			&format!("ed25519:{KEY_VERSION}"),
			Base64::new(service.keypair.public_key().to_vec()),
		);

		Ok(Arc::new(service))
	}

	fn name(&self) -> &str { service::make_name(std::module_path!()) }
}

fn load_keypair(global: &Arc<Map>) -> Result<Ed25519KeyPair> {
	let der = match global.get_blocking(KEYPAIR) {
		| Ok(der) => der,
		| Err(e) if e.is_not_found() => {
			let der = Ed25519KeyPair::generate()
				.map_err(|e| err!("signing key generation failed: {e}"))?;
			global.put(KEYPAIR, &der)?;
			der
		},
		| Err(e) => return Err(e),
	};

	Ed25519KeyPair::from_der(&der, KEY_VERSION.to_owned())
		.map_err(|e| err!(Database("stored signing key is unusable: {e}")))
}

/// Mint the next event index. The caller stages `persist_count` in the
/// same batch as the mappings using the index.
#[implement(Service)]
#[must_use]
pub fn next_count(&self) -> u64 { self.counter.fetch_add(1, Ordering::AcqRel) + 1 }

#[implement(Service)]
#[must_use]
pub fn current_count(&self) -> u64 { self.counter.load(Ordering::Acquire) }

#[implement(Service)]
pub fn persist_count(&self, batch: &mut maelstrom_database::Batch) {
	batch.set(&self.db.global, COUNTER, utils::u64_to_u8(self.current_count()));
}

#[implement(Service)]
#[inline]
#[must_use]
pub fn server_name(&self) -> &ServerName { self.server.name.as_ref() }

/// checks if `user_id` is local to us via server_name comparison
#[implement(Service)]
#[inline]
#[must_use]
pub fn user_is_local(&self, user_id: &UserId) -> bool {
	self.server_is_ours(user_id.server_name())
}

#[implement(Service)]
#[inline]
#[must_use]
pub fn server_is_ours(&self, server_name: &ServerName) -> bool {
	server_name == self.server_name()
}

/// Compute content hashes and sign a finalized wire-form event in place.
#[implement(Service)]
pub fn hash_and_sign(
	&self,
	object: &mut CanonicalJsonObject,
	room_version: &RoomVersionId,
) -> Result {
	ruma::signatures::hash_and_sign_event(
		self.server_name().as_str(),
		&self.keypair,
		object,
		room_version,
	)
	.map_err(|e| err!(Unauthorized("event signing failed: {e}")))
}

/// Verify the content hashes and origin signature of a wire-form event.
#[implement(Service)]
pub fn verify_event(
	&self,
	object: &CanonicalJsonObject,
	room_version: &RoomVersionId,
) -> Result {
	let keys = self
		.verify_keys
		.read()
		.expect("verify keys lock is never poisoned");

	ruma::signatures::verify_event(&keys, object, room_version)
		.map(|_verified| ())
		.map_err(|e| err!(Unauthorized("event verification failed: {e}")))
}

/// Trust a verification key; used for our own key at startup and by the
/// server-key collaborator for remote origins.
#[implement(Service)]
pub fn add_verify_key(&self, origin: &str, key_id: &str, key: Base64) {
	self.verify_keys
		.write()
		.expect("verify keys lock is never poisoned")
		.entry(origin.to_owned())
		.or_default()
		.insert(key_id.to_owned(), key);
}

/// Attach our signature to an arbitrary canonical object without
/// recomputing its hashes; the inbound invite leg countersigns with this.
#[implement(Service)]
pub fn sign_json(&self, object: &mut CanonicalJsonObject) -> Result {
	ruma::signatures::sign_json(self.server_name().as_str(), &self.keypair, object)
		.map_err(|e| err!(Unauthorized("signing failed: {e}")))
}
