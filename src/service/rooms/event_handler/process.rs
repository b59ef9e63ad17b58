use std::collections::HashMap;

use maelstrom_core::{
	Pdu, Result, StateKey, err, implement,
	matrix::{RoomVersion, auth, pdu::MAX_PDU_BYTES},
};
use ruma::{
	CanonicalJsonObject, OwnedEventId, RoomVersionId,
	events::{StateEventType, TimelineEventType},
};
use serde::Deserialize;
use tracing::{debug, info};

use super::{NonConform, Opts, Service};
use crate::rooms::EventIdx;

#[derive(Deserialize)]
struct ExtractVersion {
	room_version: Option<String>,
}

/// Validate, authorize and commit one event.
///
/// Stages run in order with short-circuit on failure; stages one through
/// six write nothing, the commit is one atomic batch, and the effect
/// hooks afterwards are best-effort. Re-ingesting a known event id is a
/// no-op returning its existing index.
#[implement(Service)]
#[tracing::instrument(
	skip(self, pdu, json, opts),
	level = "debug",
	fields(event_id = %pdu.event_id, room_id = %pdu.room_id),
)]
pub async fn process(
	&self,
	mut pdu: Pdu,
	json: CanonicalJsonObject,
	opts: &Opts,
) -> Result<EventIdx> {
	self.services.server.check_running()?;

	// 1. conform
	self.conform(&mut pdu, &json, opts)?;

	let room_version = self.room_version_of(&pdu).await?;
	let rules = RoomVersion::from_id(room_version.clone())?;

	// 2. hash & signature
	if opts.verify {
		self.services
			.globals
			.verify_event(&json, &room_version)?;

		let computed = maelstrom_core::matrix::gen_event_id(&json, &room_version)?;
		if computed != pdu.event_id {
			return Err(err!(Unauthorized(
				"event id {} does not address its content",
				pdu.event_id
			)));
		}
	}

	// Re-ingest short-circuit; checked again under the room lock.
	if let Ok(idx) = self.services.short.get_idx(&pdu.event_id).await {
		debug!("event already indexed");
		return Ok(idx);
	}

	// 3. fetch unknown dependencies
	self.fetch_dependencies(&pdu, opts).await?;

	// 4. auth static
	auth::check_static(&pdu, &rules).map_err(|e| err!(BadRequest("{e}")))?;

	// 5. auth against the state the event declares
	let declared = self.declared_state(&pdu).await?;
	let fetch_declared = {
		let declared = std::sync::Arc::new(declared);
		move |kind: StateEventType, state_key: StateKey| {
			let declared = declared.clone();
			async move {
				declared
					.get(&(kind, state_key.to_string()))
					.cloned()
			}
		}
	};
	let fetch_event = {
		let services = self.services.clone();
		move |event_id: OwnedEventId| {
			let services = services.clone();
			async move { services.timeline.get_pdu(&event_id).await.ok() }
		}
	};

	auth::check(&pdu, &rules, &fetch_declared, &fetch_event)
		.await
		.map_err(|e| err!(AccessDenied("declared auth: {e}")))?;

	// The room is locked from the current-state check through commit so
	// per-room commit order is total.
	let insert_lock = self
		.services
		.timeline
		.mutex_insert
		.lock(&*pdu.room_id)
		.await;

	if let Ok(idx) = self.services.short.get_idx(&pdu.event_id).await {
		return Ok(idx);
	}

	// 6. auth against the current room state
	let fetch_current = {
		let services = self.services.clone();
		let room_id = pdu.room_id.clone();
		move |kind: StateEventType, state_key: StateKey| {
			let services = services.clone();
			let room_id = room_id.clone();
			async move {
				services
					.state_accessor
					.state_get(&room_id, &kind, state_key.as_str())
					.await
					.ok()
			}
		}
	};

	auth::check(&pdu, &rules, &fetch_current, &fetch_event)
		.await
		.map_err(|e| err!(AccessDenied("current state auth: {e}")))?;

	// 7. commit
	let mut batch = self.services.db.batch();
	let idx = self
		.services
		.short
		.get_or_create_idx(&pdu.event_id, &mut batch);

	self.services
		.timeline
		.append_pdu(&mut batch, &pdu, idx)?;
	self.services.state.append_state(&mut batch, &pdu, idx)?;
	self.services.state.update_heads(&mut batch, &pdu, idx);
	self.services.db.commit(batch).await?;

	drop(insert_lock);

	// 8. effect hooks
	self.run_hooks(&pdu).await;

	if opts.infolog_accept {
		info!(
			event_id = %pdu.event_id,
			room_id = %pdu.room_id,
			kind = %pdu.kind,
			sender = %pdu.sender,
			depth = u64::from(pdu.depth),
			"accepted"
		);
	}

	Ok(idx)
}

/// Syntactic validation, partially waivable through the non_conform mask.
#[implement(Service)]
fn conform(&self, pdu: &mut Pdu, json: &CanonicalJsonObject, opts: &Opts) -> Result {
	let size = serde_json::to_vec(json)?.len();
	if size > MAX_PDU_BYTES {
		return Err(err!(Conform("event exceeds {MAX_PDU_BYTES} bytes ({size})")));
	}

	let is_create = pdu.kind == TimelineEventType::RoomCreate;

	if let Some(origin) = &pdu.origin {
		if origin != pdu.sender.server_name()
			&& !opts
				.non_conform
				.contains(NonConform::MISMATCHED_ORIGIN)
		{
			return Err(err!(Conform(
				"origin {origin} disagrees with sender {}",
				pdu.sender
			)));
		}
	}

	if !is_create
		&& pdu.prev_events.is_empty()
		&& !opts
			.non_conform
			.contains(NonConform::MISSING_PREV_EVENTS)
	{
		return Err(err!(Conform("event references no prev_events")));
	}

	// Creation options must agree with the create content they produced.
	if is_create {
		if let Some(copts) = &opts.copts {
			if let Some(version) = &copts.room_version {
				let content: ExtractVersion = pdu.get_content()?;
				if content.room_version.as_ref() != Some(version) {
					return Err(err!(Conform(
						"create content version disagrees with creation options"
					)));
				}
			}
		}
	}

	// Modern redactions carry the target in content; surface it so the
	// rest of the pipeline sees one shape.
	if pdu.kind == TimelineEventType::RoomRedaction && pdu.redacts.is_none() {
		#[derive(Deserialize)]
		struct ExtractRedacts {
			redacts: Option<OwnedEventId>,
		}

		pdu.redacts = pdu
			.get_content::<ExtractRedacts>()
			.ok()
			.and_then(|c| c.redacts);
	}

	Ok(())
}

/// The room version governing this event: from the room's create state,
/// or from the event itself when it is the create.
#[implement(Service)]
async fn room_version_of(&self, pdu: &Pdu) -> Result<RoomVersionId> {
	if pdu.kind == TimelineEventType::RoomCreate {
		let content: ExtractVersion = pdu.get_content()?;
		let version = content
			.room_version
			.unwrap_or_else(|| RoomVersion::DEFAULT.to_owned());

		return RoomVersionId::try_from(version.as_str()).map_err(Into::into);
	}

	self.services
		.state_accessor
		.room_version(&pdu.room_id)
		.await
		.map_err(|e| err!(NotFound("room {} has no create state: {e}", pdu.room_id)))
}

/// Materialize the state the event declares through its auth_events.
/// Detects fabrication: the event must be authorized even by its own
/// declaration.
#[implement(Service)]
async fn declared_state(
	&self,
	pdu: &Pdu,
) -> Result<HashMap<(StateEventType, String), Pdu>> {
	let mut declared = HashMap::with_capacity(pdu.auth_events.len());

	for event_id in &pdu.auth_events {
		let auth_pdu = self
			.services
			.timeline
			.get_pdu(event_id)
			.await
			.map_err(|e| err!(NotFound("declared auth event {event_id} unknown: {e}")))?;

		if auth_pdu.room_id != pdu.room_id {
			return Err(err!(AccessDenied(
				"declared auth event {event_id} is from another room"
			)));
		}

		let Some(state_key) = auth_pdu.state_key.clone() else {
			return Err(err!(AccessDenied(
				"declared auth event {event_id} is not a state event"
			)));
		};

		declared.insert((auth_pdu.state_kind(), state_key.to_string()), auth_pdu);
	}

	Ok(declared)
}

/// Fire the post-commit hooks. Failures are logged and swallowed; the
/// event is already committed.
#[implement(Service)]
async fn run_hooks(&self, pdu: &Pdu) {
	for hook in self.hooks_for(&pdu.kind) {
		if let Err(e) = hook.handle(pdu).await {
			tracing::warn!(event_id = %pdu.event_id, "effect hook failed: {e}");
		}
	}
}
