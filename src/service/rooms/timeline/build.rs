use maelstrom_core::{
	Err, Pdu, PduBuilder, Result, err, implement,
	matrix::pdu::{MAX_PREV_EVENTS, gen_event_id},
	utils,
};
use ruma::{
	CanonicalJsonObject, CanonicalJsonValue, Int, OwnedEventId, RoomId, RoomVersionId, UserId,
	events::{StateEventType, TimelineEventType},
};
use serde::Deserialize;

use super::Service;
use crate::rooms::{EventIdx, event_handler::Opts};

#[derive(Deserialize)]
struct ExtractVersion {
	room_version: Option<String>,
}

/// Author an event locally: place it at the room's heads, select its auth
/// events from present state, hash, sign, and run it through the pipeline.
#[implement(Service)]
#[tracing::instrument(skip(self, builder), level = "debug")]
pub async fn build_and_append(
	&self,
	room_id: &RoomId,
	sender: &UserId,
	builder: PduBuilder,
	opts: &Opts,
) -> Result<(OwnedEventId, EventIdx)> {
	let is_create = builder.event_type == TimelineEventType::RoomCreate;

	let heads: Vec<(OwnedEventId, EventIdx)> =
		self.services.state.heads(room_id).collect::<Result<_>>()?;

	if is_create && !heads.is_empty() {
		return Err!(Conflict("room {room_id} already exists"));
	}

	if !is_create && heads.is_empty() {
		return Err!(NotFound("room {room_id} does not exist"));
	}

	let mut depth: u64 = 0;
	for (_, idx) in &heads {
		depth = depth.max(self.services.state.depth(*idx).await?);
	}
	let depth = depth.saturating_add(1);

	let room_version = if is_create {
		let version: ExtractVersion = serde_json::from_str(builder.content.get())?;
		let version = version
			.room_version
			.unwrap_or_else(|| self.services.server.config.default_room_version.clone());
		RoomVersionId::try_from(version.as_str())?
	} else {
		self.services
			.state_accessor
			.room_version(room_id)
			.await?
	};

	let auth_events = self
		.auth_refs(room_id, sender, &builder)
		.await?;

	let prev_events: Vec<String> = heads
		.iter()
		.take(MAX_PREV_EVENTS)
		.map(|(event_id, _)| event_id.to_string())
		.collect();

	let timestamp = builder
		.timestamp
		.map_or_else(utils::now_millis, |ts| ts.0.into());

	let mut object = CanonicalJsonObject::new();
	object.insert(
		"type".to_owned(),
		CanonicalJsonValue::String(builder.event_type.to_string()),
	);
	object.insert(
		"content".to_owned(),
		serde_json::from_str::<serde_json::Value>(builder.content.get())?.try_into()?,
	);
	object.insert("room_id".to_owned(), CanonicalJsonValue::String(room_id.to_string()));
	object.insert("sender".to_owned(), CanonicalJsonValue::String(sender.to_string()));
	object.insert(
		"origin".to_owned(),
		CanonicalJsonValue::String(self.services.globals.server_name().to_string()),
	);
	object.insert(
		"origin_server_ts".to_owned(),
		CanonicalJsonValue::Integer(
			Int::try_from(timestamp).map_err(|e| err!("timestamp out of range: {e}"))?,
		),
	);
	object.insert(
		"depth".to_owned(),
		CanonicalJsonValue::Integer(
			Int::try_from(depth).map_err(|e| err!("depth out of range: {e}"))?,
		),
	);
	object.insert(
		"prev_events".to_owned(),
		CanonicalJsonValue::Array(
			prev_events
				.into_iter()
				.map(CanonicalJsonValue::String)
				.collect(),
		),
	);
	object.insert(
		"auth_events".to_owned(),
		CanonicalJsonValue::Array(
			auth_events
				.into_iter()
				.map(|id| CanonicalJsonValue::String(id.to_string()))
				.collect(),
		),
	);

	if let Some(state_key) = &builder.state_key {
		object.insert("state_key".to_owned(), CanonicalJsonValue::String(state_key.clone()));
	}

	if let Some(redacts) = &builder.redacts {
		object.insert("redacts".to_owned(), CanonicalJsonValue::String(redacts.to_string()));
	}

	if let Some(unsigned) = &builder.unsigned {
		object.insert(
			"unsigned".to_owned(),
			serde_json::from_str::<serde_json::Value>(unsigned.get())?.try_into()?,
		);
	}

	self.services
		.globals
		.hash_and_sign(&mut object, &room_version)?;

	let event_id = gen_event_id(&object, &room_version)?;
	let pdu = Pdu::from_id_val(&event_id, object.clone())?;

	let idx = self
		.services
		.event_handler
		.process(pdu, object, opts)
		.await?;

	Ok((event_id, idx))
}

/// The state events authorizing a new local event, drawn from present
/// state: always the create event; the sender's membership and the power
/// levels when they exist; and for membership events the target's current
/// membership and the join rules.
#[implement(Service)]
async fn auth_refs(
	&self,
	room_id: &RoomId,
	sender: &UserId,
	builder: &PduBuilder,
) -> Result<Vec<OwnedEventId>> {
	if builder.event_type == TimelineEventType::RoomCreate {
		return Ok(Vec::new());
	}

	let mut wanted: Vec<(StateEventType, String)> = vec![
		(StateEventType::RoomCreate, String::new()),
		(StateEventType::RoomPowerLevels, String::new()),
		(StateEventType::RoomMember, sender.to_string()),
	];

	if builder.event_type == TimelineEventType::RoomMember {
		if let Some(target) = &builder.state_key {
			if target != sender.as_str() {
				wanted.push((StateEventType::RoomMember, target.clone()));
			}
		}

		wanted.push((StateEventType::RoomJoinRules, String::new()));
	}

	let mut refs = Vec::with_capacity(wanted.len());
	for (kind, state_key) in wanted {
		match self
			.services
			.state_accessor
			.state_get_idx(room_id, &kind, &state_key)
			.await
		{
			| Ok(idx) => refs.push(self.services.short.get_eventid(idx).await?),
			| Err(e) if e.is_not_found() => {},
			| Err(e) => return Err(e),
		}
	}

	Ok(refs)
}

/// Invite a user by state event. For a remote invitee the committed event
/// is also proposed to their server through the federation collaborator;
/// transport failures are logged, the local invite stands.
#[implement(Service)]
#[tracing::instrument(skip(self), level = "debug")]
pub async fn invite(
	&self,
	room_id: &RoomId,
	sender: &UserId,
	target: &UserId,
) -> Result<OwnedEventId> {
	let invite = PduBuilder {
		event_type: TimelineEventType::RoomMember,
		content: serde_json::value::to_raw_value(&serde_json::json!({
			"membership": "invite",
		}))?,
		unsigned: None,
		state_key: Some(target.to_string()),
		redacts: None,
		timestamp: None,
	};

	let (event_id, idx) = self
		.build_and_append(room_id, sender, invite, &Opts::local())
		.await?;

	if !self.services.globals.user_is_local(target) {
		let event = self.get_pdu_from_idx(idx).await?.to_canonical_object()?;
		let services = self.services.clone();
		let room_id = room_id.to_owned();
		let target = target.to_owned();
		let proposal_id = event_id.clone();

		// Propose on a task of its own; the local invite already stands.
		maelstrom_core::ctx::spawn("invite-proposal", async move {
			if let Err(e) = services
				.federation
				.send_invite(target.server_name(), &room_id, &proposal_id, event)
				.await
			{
				tracing::warn!(
					event_id = %proposal_id,
					invitee = %target,
					"remote invite proposal failed: {e}"
				);
			}
		});
	}

	Ok(event_id)
}
