mod append;
mod build;

use std::sync::Arc;

use maelstrom_core::{
	Pdu, Result, err, implement, utils,
	utils::{MutexMap, MutexMapGuard, result::NotFound},
};
use maelstrom_database::{Map, keyval, split_u64_tail};
use ruma::{EventId, OwnedRoomId, RoomId};
use serde_json::Value as JsonValue;

use super::EventIdx;
use crate::service;

pub type RoomMutexMap = MutexMap<OwnedRoomId, ()>;
pub type RoomMutexGuard = MutexMapGuard<OwnedRoomId, ()>;

/// Event shard I/O and the per-room timeline ordering. Events are stored
/// one column per field keyed by index; this service assembles and stages
/// them, and serves depth-ordered scans of a room.
pub struct Service {
	services: Arc<crate::OnceServices>,
	db: Data,

	/// Serializes commits per room; the pipeline holds it from the
	/// current-state auth check through the batch commit.
	pub mutex_insert: RoomMutexMap,
}

struct Data {
	event_auth_events: Arc<Map>,
	event_content: Arc<Map>,
	event_depth: Arc<Map>,
	event_hashes: Arc<Map>,
	event_membership: Arc<Map>,
	event_origin: Arc<Map>,
	event_origin_server_ts: Arc<Map>,
	event_prev_events: Arc<Map>,
	event_redacts: Arc<Map>,
	event_room_id: Arc<Map>,
	event_sender: Arc<Map>,
	event_signatures: Arc<Map>,
	event_state_key: Arc<Map>,
	event_type: Arc<Map>,
	event_unsigned: Arc<Map>,
	room_events: Arc<Map>,
}

impl crate::Service for Service {
	fn build(args: &crate::Args<'_>) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			services: args.services.clone(),
			db: Data {
				event_auth_events: args.db["event_auth_events"].clone(),
				event_content: args.db["event_content"].clone(),
				event_depth: args.db["event_depth"].clone(),
				event_hashes: args.db["event_hashes"].clone(),
				event_membership: args.db["event_membership"].clone(),
				event_origin: args.db["event_origin"].clone(),
				event_origin_server_ts: args.db["event_origin_server_ts"].clone(),
				event_prev_events: args.db["event_prev_events"].clone(),
				event_redacts: args.db["event_redacts"].clone(),
				event_room_id: args.db["event_room_id"].clone(),
				event_sender: args.db["event_sender"].clone(),
				event_signatures: args.db["event_signatures"].clone(),
				event_state_key: args.db["event_state_key"].clone(),
				event_type: args.db["event_type"].clone(),
				event_unsigned: args.db["event_unsigned"].clone(),
				room_events: args.db["room_events"].clone(),
			},
			mutex_insert: RoomMutexMap::new(),
		}))
	}

	fn name(&self) -> &str { service::make_name(std::module_path!()) }
}

#[implement(Service)]
pub async fn pdu_exists(&self, event_id: &EventId) -> bool {
	self.services.short.get_idx(event_id).await.is_ok()
}

#[implement(Service)]
pub async fn get_pdu(&self, event_id: &EventId) -> Result<Pdu> {
	let idx = self.services.short.get_idx(event_id).await?;
	self.get_pdu_from_idx(idx).await
}

/// Reassemble an event from its field shards.
#[implement(Service)]
#[tracing::instrument(skip(self), level = "trace")]
pub async fn get_pdu_from_idx(&self, idx: EventIdx) -> Result<Pdu> {
	let i = utils::u64_to_u8(idx);
	let event_id = self.services.short.get_eventid(idx).await?;

	let mut object = serde_json::Map::new();
	object.insert("event_id".to_owned(), JsonValue::String(event_id.into()));

	let kind = self.db.event_type.get(i).await?;
	object.insert("type".to_owned(), JsonValue::String(utils::string_from_u8(&kind)?));

	let sender = self.db.event_sender.get(i).await?;
	object.insert("sender".to_owned(), JsonValue::String(utils::string_from_u8(&sender)?));

	let room_id = self.db.event_room_id.get(i).await?;
	object.insert("room_id".to_owned(), JsonValue::String(utils::string_from_u8(&room_id)?));

	let content = self.db.event_content.get(i).await?;
	object.insert("content".to_owned(), serde_json::from_slice(&content)?);

	let ts = self.db.event_origin_server_ts.get(i).await?;
	object.insert(
		"origin_server_ts".to_owned(),
		JsonValue::from(utils::checked_u64_from_u8(&ts)?),
	);

	let depth = self.db.event_depth.get(i).await?;
	object.insert("depth".to_owned(), JsonValue::from(utils::checked_u64_from_u8(&depth)?));

	let prev_events = self.db.event_prev_events.get(i).await?;
	object.insert("prev_events".to_owned(), serde_json::from_slice(&prev_events)?);

	let auth_events = self.db.event_auth_events.get(i).await?;
	object.insert("auth_events".to_owned(), serde_json::from_slice(&auth_events)?);

	let hashes = self.db.event_hashes.get(i).await?;
	object.insert("hashes".to_owned(), serde_json::from_slice(&hashes)?);

	if let Some(state_key) = self.db.event_state_key.get(i).await.optional()? {
		object.insert(
			"state_key".to_owned(),
			JsonValue::String(utils::string_from_u8(&state_key)?),
		);
	}

	if let Some(origin) = self.db.event_origin.get(i).await.optional()? {
		object
			.insert("origin".to_owned(), JsonValue::String(utils::string_from_u8(&origin)?));
	}

	if let Some(redacts) = self.db.event_redacts.get(i).await.optional()? {
		object.insert(
			"redacts".to_owned(),
			JsonValue::String(utils::string_from_u8(&redacts)?),
		);
	}

	if let Some(signatures) = self.db.event_signatures.get(i).await.optional()? {
		object.insert("signatures".to_owned(), serde_json::from_slice(&signatures)?);
	}

	if let Some(unsigned) = self.db.event_unsigned.get(i).await.optional()? {
		object.insert("unsigned".to_owned(), serde_json::from_slice(&unsigned)?);
	}

	serde_json::from_value(JsonValue::Object(object))
		.map_err(|e| err!(Database("event {idx} failed to reassemble: {e}")))
}

#[implement(Service)]
pub async fn get_depth(&self, idx: EventIdx) -> Result<u64> {
	let val = self.db.event_depth.get(utils::u64_to_u8(idx)).await?;
	utils::checked_u64_from_u8(&val)
}

#[implement(Service)]
pub async fn get_room_id(&self, idx: EventIdx) -> Result<ruma::OwnedRoomId> {
	let val = self.db.event_room_id.get(utils::u64_to_u8(idx)).await?;

	utils::str_from_u8(&val)?
		.try_into()
		.map_err(|e| err!(Database("room id for event {idx} is corrupt: {e}")))
}

/// Depth-descending scan of a room's events, starting at-or-below
/// `until_depth` when given.
#[implement(Service)]
pub fn pdus_rev<'a>(
	&'a self,
	room_id: &RoomId,
	until_depth: Option<u64>,
) -> impl Iterator<Item = Result<(u64, EventIdx)>> + 'a {
	let prefix = keyval::prefix(&[room_id.as_str()]);

	let mut from = prefix.clone();
	keyval::push_u64(&mut from, until_depth.unwrap_or(u64::MAX));
	keyval::push_u64(&mut from, u64::MAX);

	self.db
		.room_events
		.rev_iter_from_prefix(&prefix, &from)
		.map(|item| {
			let (key, _) = item?;
			let (head, idx) = split_u64_tail(&key)?;
			let (_, depth) = split_u64_tail(head)?;
			Ok((depth, idx))
		})
}

/// Depth-ascending scan of a room's events from `from_depth`.
#[implement(Service)]
pub fn pdus<'a>(
	&'a self,
	room_id: &RoomId,
	from_depth: Option<u64>,
) -> impl Iterator<Item = Result<(u64, EventIdx)>> + 'a {
	let prefix = keyval::prefix(&[room_id.as_str()]);

	let mut from = prefix.clone();
	keyval::push_u64(&mut from, from_depth.unwrap_or(0));

	self.db
		.room_events
		.iter_from_prefix(&prefix, &from)
		.map(|item| {
			let (key, _) = item?;
			let (head, idx) = split_u64_tail(&key)?;
			let (_, depth) = split_u64_tail(head)?;
			Ok((depth, idx))
		})
}

/// Membership fast path off the sharded column; avoids reassembling the
/// whole member event.
#[implement(Service)]
pub async fn get_membership(
	&self,
	idx: EventIdx,
) -> Result<ruma::events::room::member::MembershipState> {
	let val = self.db.event_membership.get(utils::u64_to_u8(idx)).await?;

	Ok(utils::str_from_u8(&val)?.into())
}
