use axum::{Json, extract::Path};
use http::HeaderMap;
use maelstrom_core::{Pdu, err};
use ruma::{OwnedRoomId, UserId};
use serde_json::{Value as JsonValue, json};

use super::sender_user;
use crate::{Result, State};

/// # `GET /_matrix/client/v3/rooms/{roomId}/initialSync`
///
/// Snapshot of one room: the caller's membership, the present state, and
/// the most recent stretch of the timeline.
pub(crate) async fn initial_sync_route(
	State(services): State,
	Path(room_id): Path<OwnedRoomId>,
	headers: HeaderMap,
) -> Result<Json<JsonValue>> {
	let sender = sender_user(&headers)?;

	if !services.state_accessor.exists(&room_id).await {
		return Err(err!(NotFound("room_id '{room_id}' does not exist")).into());
	}

	if !services
		.state_accessor
		.user_can_see_events(&sender, &room_id)
		.await
	{
		return Err(err!(AccessDenied("you are not permitted to view this room")).into());
	}

	let membership = services
		.state_accessor
		.user_membership(&room_id, &sender)
		.await;

	let visibility = if services.state_accessor.is_world_readable(&room_id).await {
		"public"
	} else {
		"private"
	};

	let mut state = Vec::new();
	for entry in services.state_accessor.state_full(&room_id) {
		let (.., idx) = entry?;
		let pdu = services.timeline.get_pdu_from_idx(idx).await?;
		state.push(pdu.to_room_event());
	}

	// The last `initialsync_backfill` events visible to the caller, oldest
	// first.
	let limit = services.server.config.initialsync_backfill;
	let mut chunk: Vec<Pdu> = Vec::with_capacity(limit);

	let recent: Vec<(u64, u64)> = services
		.timeline
		.pdus_rev(&room_id, None)
		.take(limit.saturating_mul(2))
		.collect::<maelstrom_core::Result<_>>()?;

	for (_, idx) in recent {
		if chunk.len() >= limit {
			break;
		}

		let pdu = services.timeline.get_pdu_from_idx(idx).await?;
		if visible_in_timeline(&pdu, &sender) {
			chunk.push(pdu);
		}
	}

	chunk.reverse();

	let start = chunk
		.first()
		.map_or_else(String::new, |pdu| pdu.depth.to_string());
	let end = chunk
		.last()
		.map_or_else(String::new, |pdu| pdu.depth.to_string());

	let chunk: Vec<JsonValue> = chunk.iter().map(Pdu::to_room_event).collect();

	Ok(Json(json!({
		"room_id": room_id,
		"membership": membership.to_string(),
		"visibility": visibility,
		"account_data": [],
		"state": state,
		"messages": {
			"start": start,
			"end": end,
			"chunk": chunk,
		},
	})))
}

/// Redacted events disappear from the timeline for everyone except their
/// sender and, for state events, their target.
fn visible_in_timeline(pdu: &Pdu, caller: &UserId) -> bool {
	if !pdu.is_redacted() {
		return true;
	}

	pdu.sender == caller || pdu.state_key.as_deref() == Some(caller.as_str())
}
