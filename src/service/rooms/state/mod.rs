use std::sync::Arc;

use maelstrom_core::{Pdu, Result, err, implement, utils};
use maelstrom_database::{Batch, Map, key2, key3, keyval, split2, split_u64_tail};
use ruma::{OwnedEventId, RoomId};
use tracing::{debug, warn};

use super::{EventIdx, metadata::RefKind};
use crate::service;

/// Write side of the room state machinery: the present-state column, the
/// historical state space, and the head set. Everything here stages into
/// the commit batch of the event being applied; the resolver in
/// `state_accessor` is the read side.
pub struct Service {
	db: Data,
	services: Arc<crate::OnceServices>,
}

struct Data {
	event_depth: Arc<Map>,
	room_events: Arc<Map>,
	room_head: Arc<Map>,
	room_state: Arc<Map>,
	room_state_space: Arc<Map>,
}

impl crate::Service for Service {
	fn build(args: &crate::Args<'_>) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			db: Data {
				event_depth: args.db["event_depth"].clone(),
				room_events: args.db["room_events"].clone(),
				room_head: args.db["room_head"].clone(),
				room_state: args.db["room_state"].clone(),
				room_state_space: args.db["room_state_space"].clone(),
			},
			services: args.services.clone(),
		}))
	}

	fn name(&self) -> &str { service::make_name(std::module_path!()) }
}

/// Stage the state-column writes for a state event: the prev/next-state
/// edges, the present-state overwrite, and the state-space entry.
#[implement(Service)]
pub fn append_state(&self, batch: &mut Batch, pdu: &Pdu, idx: EventIdx) -> Result {
	let Some(state_key) = pdu.state_key.as_deref() else {
		return Ok(());
	};

	let kind = pdu.kind.to_string();
	let room = pdu.room_id.as_str();
	let state_col_key = key3(room, &kind, state_key);

	match self.db.room_state.get_blocking(&state_col_key) {
		| Ok(prev) => {
			let prev_idx = utils::checked_u64_from_u8(&prev)?;
			self.services
				.metadata
				.add_ref(batch, prev_idx, RefKind::NextState, idx);
			self.services
				.metadata
				.add_ref(batch, idx, RefKind::PrevState, prev_idx);
		},
		| Err(e) if e.is_not_found() => {},
		| Err(e) => return Err(e),
	}

	batch.set(&self.db.room_state, &state_col_key, utils::u64_to_u8(idx));

	let mut space_key = keyval::prefix(&[room, &kind, state_key]);
	keyval::push_u64(&mut space_key, pdu.depth.into());
	keyval::push_u64(&mut space_key, idx);
	batch.set(&self.db.room_state_space, space_key, b"");

	self.services
		.state_cache
		.update_membership(batch, pdu, idx)
}

/// Stage the head-set update: referenced parents stop being heads and the
/// new event becomes one.
#[implement(Service)]
pub fn update_heads(&self, batch: &mut Batch, pdu: &Pdu, idx: EventIdx) {
	let room = pdu.room_id.as_str();

	for prev in &pdu.prev_events {
		batch.del(&self.db.room_head, key2(room, prev.as_str()));
	}

	batch.set(&self.db.room_head, key2(room, pdu.event_id.as_str()), utils::u64_to_u8(idx));
}

#[implement(Service)]
pub fn heads<'a>(
	&'a self,
	room_id: &RoomId,
) -> impl Iterator<Item = Result<(OwnedEventId, EventIdx)>> + 'a {
	let prefix = keyval::prefix(&[room_id.as_str()]);
	self.db.room_head.iter_prefix(&prefix).map(|item| {
		let (key, val) = item?;
		let (_, event_id) = split2(&key)?;
		let event_id = event_id
			.try_into()
			.map_err(|e| err!(Database("head key holds a bad event id: {e}")))?;

		Ok((event_id, utils::checked_u64_from_u8(&val)?))
	})
}

/// The deepest head; ties break toward the most recently indexed event.
#[implement(Service)]
pub async fn head(&self, room_id: &RoomId) -> Result<(OwnedEventId, EventIdx)> {
	let mut best: Option<(u64, EventIdx, OwnedEventId)> = None;

	for item in self.heads(room_id) {
		let (event_id, idx) = item?;
		let depth = self.depth(idx).await?;

		if best
			.as_ref()
			.is_none_or(|(d, i, _)| (depth, idx) > (*d, *i))
		{
			best = Some((depth, idx, event_id));
		}
	}

	best.map(|(_, idx, event_id)| (event_id, idx))
		.ok_or_else(|| err!(NotFound("room {room_id} has no head")))
}

#[implement(Service)]
pub async fn depth(&self, idx: EventIdx) -> Result<u64> {
	let val = self.db.event_depth.get(utils::u64_to_u8(idx)).await?;
	utils::checked_u64_from_u8(&val)
}

/// Rescue from head divergence: collapse the head set to the single
/// deepest event in the room.
#[implement(Service)]
#[tracing::instrument(skip(self), level = "debug")]
pub async fn reset(&self, room_id: &RoomId) -> Result {
	let prefix = keyval::prefix(&[room_id.as_str()]);

	let deepest = self
		.db
		.room_events
		.rev_iter_prefix(&prefix)
		.next()
		.transpose()?
		.ok_or_else(|| err!(NotFound("room {room_id} has no events")))?;

	let (key, _) = deepest;
	let (_, idx) = split_u64_tail(&key)?;
	let event_id = self.services.short.get_eventid(idx).await?;

	self.replace_heads(room_id, &[(event_id.clone(), idx)])?;
	debug!(%room_id, %event_id, "head set reset to deepest event");

	Ok(())
}

/// Reconstruct the head set by walking the room forward and keeping the
/// events without local children.
#[implement(Service)]
#[tracing::instrument(skip(self), level = "debug")]
pub async fn rebuild(&self, room_id: &RoomId) -> Result {
	let prefix = keyval::prefix(&[room_id.as_str()]);
	let mut heads = Vec::new();

	let indices: Vec<EventIdx> = self
		.db
		.room_events
		.iter_prefix(&prefix)
		.map(|item| {
			let (key, _) = item?;
			let (_, idx) = split_u64_tail(&key)?;
			Ok(idx)
		})
		.collect::<Result<_>>()?;

	for idx in indices {
		if !self.services.metadata.has_children(idx).await {
			let event_id = self.services.short.get_eventid(idx).await?;
			heads.push((event_id, idx));
		}
	}

	if heads.is_empty() {
		warn!(%room_id, "rebuild found no childless events; head set left untouched");
		return Ok(());
	}

	self.replace_heads(room_id, &heads)
}

#[implement(Service)]
fn replace_heads(&self, room_id: &RoomId, heads: &[(OwnedEventId, EventIdx)]) -> Result {
	let prefix = keyval::prefix(&[room_id.as_str()]);

	let stale: Vec<Vec<u8>> = self
		.db
		.room_head
		.iter_prefix(&prefix)
		.map(|item| item.map(|(key, _)| key))
		.collect::<Result<_>>()?;

	for key in stale {
		self.db.room_head.del(key)?;
	}

	for (event_id, idx) in heads {
		self.db
			.room_head
			.put(key2(room_id.as_str(), event_id.as_str()), utils::u64_to_u8(*idx))?;
	}

	Ok(())
}
