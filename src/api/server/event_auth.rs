use std::collections::HashSet;

use axum::{Json, extract::Path};
use http::HeaderMap;
use maelstrom_core::err;
use ruma::{
	OwnedEventId, OwnedRoomId, UserId, events::room::member::MembershipState,
};
use serde_json::{Value as JsonValue, json};

use super::origin;
use crate::{Result, State};

/// # `GET /_matrix/federation/v1/event_auth/{roomId}/{eventId}`
///
/// The transitive closure of the event's auth_events.
pub(crate) async fn event_auth_route(
	State(services): State,
	Path((room_id, event_id)): Path<(OwnedRoomId, OwnedEventId)>,
	headers: HeaderMap,
) -> Result<Json<JsonValue>> {
	let origin = origin(&headers)?;

	let event = services.timeline.get_pdu(&event_id).await?;
	if event.room_id != room_id {
		return Err(err!(NotFound("event {event_id} is not in {room_id}")).into());
	}

	let mut visible = services
		.state_accessor
		.server_can_see(&origin, &room_id)
		.await;

	// A server may always retrieve the auth chain of an invite aimed at
	// one of its own users.
	if !visible {
		visible = invitee_exception(&event, &origin);
	}

	if !visible {
		return Err(
			err!(AccessDenied("you are not permitted to view the room at this event")).into(),
		);
	}

	let mut chain = Vec::new();
	let mut pending: Vec<OwnedEventId> = event.auth_events.iter().cloned().collect();
	let mut seen: HashSet<OwnedEventId> = pending.iter().cloned().collect();

	while let Some(auth_id) = pending.pop() {
		let auth_event = services.timeline.get_pdu(&auth_id).await?;

		for parent in &auth_event.auth_events {
			if seen.insert(parent.clone()) {
				pending.push(parent.clone());
			}
		}

		chain.push(serde_json::to_value(auth_event.to_canonical_object()?)
			.map_err(maelstrom_core::Error::from)?);
	}

	Ok(Json(json!({ "auth_chain": chain })))
}

fn invitee_exception(event: &maelstrom_core::Pdu, origin: &ruma::ServerName) -> bool {
	let Some(state_key) = event.state_key.as_deref() else {
		return false;
	};

	let Ok(target) = <&UserId>::try_from(state_key) else {
		return false;
	};

	target.server_name() == origin
		&& event
			.membership()
			.is_ok_and(|m| m == MembershipState::Invite)
}
