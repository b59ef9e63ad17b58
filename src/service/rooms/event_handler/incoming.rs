use maelstrom_core::{
	Pdu, Result, err, implement,
	matrix::{RoomVersion, gen_event_id},
};
use ruma::{CanonicalJsonObject, CanonicalJsonValue, RoomId, RoomVersionId, ServerName};

use super::{Opts, Service};
use crate::rooms::EventIdx;

/// Ingest a PDU received over federation. The wire form carries no event
/// id; it is minted here from the reference hash under the room's
/// version, then the event runs the full pipeline.
#[implement(Service)]
#[tracing::instrument(skip(self, value, opts), level = "debug", fields(%origin, %room_id))]
pub async fn handle_incoming(
	&self,
	origin: &ServerName,
	room_id: &RoomId,
	mut value: CanonicalJsonObject,
	opts: Opts,
) -> Result<EventIdx> {
	// Stray id annotations must not poison the content address.
	value.remove("event_id");

	match value.get("room_id") {
		| Some(CanonicalJsonValue::String(claimed)) if claimed.as_str() == room_id.as_str() => {},
		| Some(_) =>
			return Err(err!(Conform("event claims a different room than the envelope"))),
		| None => {
			value.insert(
				"room_id".to_owned(),
				CanonicalJsonValue::String(room_id.to_string()),
			);
		},
	}

	let room_version = self.incoming_room_version(room_id, &value).await?;
	let event_id = gen_event_id(&value, &room_version)?;
	let pdu = Pdu::from_id_val(&event_id, value.clone())?;

	self.process(pdu, value, &opts).await
}

#[implement(Service)]
async fn incoming_room_version(
	&self,
	room_id: &RoomId,
	value: &CanonicalJsonObject,
) -> Result<RoomVersionId> {
	let is_create = matches!(
		value.get("type"),
		Some(CanonicalJsonValue::String(kind)) if kind == "m.room.create"
	);

	if is_create {
		let version = value
			.get("content")
			.and_then(|content| match content {
				| CanonicalJsonValue::Object(content) => content.get("room_version"),
				| _ => None,
			})
			.and_then(|version| match version {
				| CanonicalJsonValue::String(version) => Some(version.as_str()),
				| _ => None,
			})
			.unwrap_or(RoomVersion::DEFAULT);

		return RoomVersionId::try_from(version).map_err(Into::into);
	}

	self.services.state_accessor.room_version(room_id).await
}
