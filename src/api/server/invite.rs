use axum::{Json, extract::Path};
use http::HeaderMap;
use maelstrom_core::err;
use ruma::{
	CanonicalJsonObject, OwnedEventId, OwnedRoomId, RoomVersionId,
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use super::origin;
use crate::{Result, State};

#[derive(Deserialize)]
pub(crate) struct InviteBody {
	event: CanonicalJsonObject,

	room_version: RoomVersionId,
}

/// # `PUT /_matrix/federation/v1/invite/{roomId}/{eventId}`
///
/// Inbound leg: a remote server proposes an invite for one of our users.
/// We verify the proposer's signature, countersign, and return the event;
/// it enters our room graph only if the invite is later acted on.
pub(crate) async fn invite_route(
	State(services): State,
	Path((room_id, event_id)): Path<(OwnedRoomId, OwnedEventId)>,
	headers: HeaderMap,
	Json(body): Json<InviteBody>,
) -> Result<Json<JsonValue>> {
	let origin = origin(&headers)?;
	let mut event = body.event;

	match event.get("room_id") {
		| Some(ruma::CanonicalJsonValue::String(claimed)) if *claimed == room_id.to_string() => {},
		| _ => return Err(err!(BadRequest("invite event is not for {room_id}")).into()),
	}

	let target = match event.get("state_key") {
		| Some(ruma::CanonicalJsonValue::String(target)) => target.clone(),
		| _ => return Err(err!(BadRequest("invite event has no state_key")).into()),
	};

	let target: ruma::OwnedUserId = target
		.try_into()
		.map_err(|_| err!(BadRequest("invite state_key is not a user id")))?;

	if !services.globals.user_is_local(&target) {
		return Err(err!(AccessDenied("{target} is not a user on this server")).into());
	}

	services
		.globals
		.verify_event(&event, &body.room_version)
		.map_err(|_| err!(Unauthorized("invite from {origin} is not validly signed")))?;

	services.globals.sign_json(&mut event)?;

	tracing::info!(%event_id, %room_id, invitee = %target, proposer = %origin, "invite countersigned");

	Ok(Json(json!({ "event": event })))
}
