use maelstrom_core::{Pdu, Result, implement, utils};
use maelstrom_database::{Batch, keyval};
use ruma::events::TimelineEventType;
use tracing::warn;

use super::Service;
use crate::rooms::{EventIdx, metadata::RefKind};

/// Stage every timeline-side column write for one event: the field shards,
/// the depth ordering, and the backward graph edges. State columns are
/// staged by the state service into the same batch.
#[implement(Service)]
pub(crate) fn append_pdu(&self, batch: &mut Batch, pdu: &Pdu, idx: EventIdx) -> Result {
	let i = utils::u64_to_u8(idx);

	batch.set(&self.db.event_type, i, pdu.kind.to_string());
	batch.set(&self.db.event_sender, i, pdu.sender.as_bytes());
	batch.set(&self.db.event_room_id, i, pdu.room_id.as_bytes());
	batch.set(&self.db.event_content, i, pdu.content.get());
	batch.set(
		&self.db.event_origin_server_ts,
		i,
		utils::u64_to_u8(pdu.origin_server_ts.into()),
	);
	batch.set(&self.db.event_depth, i, utils::u64_to_u8(pdu.depth.into()));
	batch.set(&self.db.event_prev_events, i, serde_json::to_vec(&pdu.prev_events)?);
	batch.set(&self.db.event_auth_events, i, serde_json::to_vec(&pdu.auth_events)?);
	batch.set(&self.db.event_hashes, i, serde_json::to_vec(&pdu.hashes)?);

	if let Some(state_key) = pdu.state_key.as_deref() {
		batch.set(&self.db.event_state_key, i, state_key.as_bytes());
	}

	if let Some(origin) = &pdu.origin {
		batch.set(&self.db.event_origin, i, origin.as_bytes());
	}

	if let Some(redacts) = &pdu.redacts {
		batch.set(&self.db.event_redacts, i, redacts.as_bytes());
	}

	if let Some(signatures) = &pdu.signatures {
		batch.set(&self.db.event_signatures, i, signatures.get());
	}

	if let Some(unsigned) = &pdu.unsigned {
		batch.set(&self.db.event_unsigned, i, unsigned.get());
	}

	if pdu.kind == TimelineEventType::RoomMember {
		if let Ok(membership) = pdu.membership() {
			batch.set(&self.db.event_membership, i, membership.to_string());
		}
	}

	let mut order_key = keyval::prefix(&[pdu.room_id.as_str()]);
	keyval::push_u64(&mut order_key, pdu.depth.into());
	keyval::push_u64(&mut order_key, idx);
	batch.set(&self.db.room_events, order_key, b"");

	// Backward edges; forward edges live in the prev/auth shards above.
	for prev in &pdu.prev_events {
		match self.services.short.get_idx_blocking(prev) {
			| Ok(prev_idx) => self
				.services
				.metadata
				.add_ref(batch, prev_idx, RefKind::PrevEvent, idx),
			| Err(e) if e.is_not_found() =>
				warn!(event_id = %pdu.event_id, %prev, "prev_event not indexed; edge dropped"),
			| Err(e) => return Err(e),
		}
	}

	for auth in &pdu.auth_events {
		match self.services.short.get_idx_blocking(auth) {
			| Ok(auth_idx) => self
				.services
				.metadata
				.add_ref(batch, auth_idx, RefKind::AuthEvent, idx),
			| Err(e) if e.is_not_found() =>
				warn!(event_id = %pdu.event_id, %auth, "auth_event not indexed; edge dropped"),
			| Err(e) => return Err(e),
		}
	}

	Ok(())
}

/// Apply an accepted redaction to its target's stored shards. Runs as a
/// post-commit effect; the target keeps its index and placement.
#[implement(Service)]
#[tracing::instrument(skip(self, redaction), level = "debug")]
pub async fn redact_pdu(&self, redaction: &Pdu) -> Result {
	let Some(target_id) = redaction.redacts.clone() else {
		return Ok(());
	};

	let idx = match self.services.short.get_idx(&target_id).await {
		| Ok(idx) => idx,
		// A redaction may land before its target; nothing to strip yet.
		| Err(e) if e.is_not_found() => return Ok(()),
		| Err(e) => return Err(e),
	};

	let mut target = self.get_pdu_from_idx(idx).await?;
	let room_version = self
		.services
		.state_accessor
		.room_version(&target.room_id)
		.await?;

	target.redact(&room_version, redaction)?;

	// Shard rewrite failures surface to the hook runner, which logs and
	// moves on; the redaction itself is already committed.
	let i = utils::u64_to_u8(idx);
	self.db.event_content.put(i, target.content.get())?;
	if let Some(unsigned) = &target.unsigned {
		self.db.event_unsigned.put(i, unsigned.get())?;
	}

	Ok(())
}
