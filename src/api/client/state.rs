use axum::{Json, extract::Path};
use http::HeaderMap;
use maelstrom_core::{PduBuilder, err};
use ruma::{OwnedRoomId, events::StateEventType};
use serde_json::{Value as JsonValue, json, value::to_raw_value};

use super::sender_user;
use crate::{Result, State};
use maelstrom_service::rooms::event_handler::Opts;

/// # `GET /_matrix/client/v3/rooms/{roomId}/state`
///
/// The full present state of the room as an event array.
pub(crate) async fn get_state_route(
	State(services): State,
	Path(room_id): Path<OwnedRoomId>,
	headers: HeaderMap,
) -> Result<Json<JsonValue>> {
	let sender = sender_user(&headers)?;

	if !services.state_accessor.exists(&room_id).await {
		return Err(err!(NotFound("room {room_id} does not exist")).into());
	}

	if !services
		.state_accessor
		.user_can_see_state(&sender, &room_id)
		.await
	{
		return Err(
			err!(AccessDenied("you are not permitted to view the room state")).into(),
		);
	}

	let mut events = Vec::new();
	for entry in services.state_accessor.state_full(&room_id) {
		let (.., idx) = entry?;
		let pdu = services.timeline.get_pdu_from_idx(idx).await?;
		events.push(pdu.to_room_event());
	}

	Ok(Json(JsonValue::Array(events)))
}

/// # `GET /_matrix/client/v3/rooms/{roomId}/state/{eventType}`
pub(crate) async fn get_state_for_empty_key_route(
	State(services): State,
	Path((room_id, event_type)): Path<(OwnedRoomId, String)>,
	headers: HeaderMap,
) -> Result<Json<JsonValue>> {
	get_state_event(services, room_id, event_type, String::new(), headers).await
}

/// # `GET /_matrix/client/v3/rooms/{roomId}/state/{eventType}/{stateKey}`
pub(crate) async fn get_state_for_key_route(
	State(services): State,
	Path((room_id, event_type, state_key)): Path<(OwnedRoomId, String, String)>,
	headers: HeaderMap,
) -> Result<Json<JsonValue>> {
	get_state_event(services, room_id, event_type, state_key, headers).await
}

async fn get_state_event(
	services: std::sync::Arc<maelstrom_service::Services>,
	room_id: OwnedRoomId,
	event_type: String,
	state_key: String,
	headers: HeaderMap,
) -> Result<Json<JsonValue>> {
	let sender = sender_user(&headers)?;

	if !services
		.state_accessor
		.user_can_see_state(&sender, &room_id)
		.await
	{
		return Err(
			err!(AccessDenied("you are not permitted to view the room state")).into(),
		);
	}

	let kind = StateEventType::from(event_type);
	let pdu = services
		.state_accessor
		.state_get(&room_id, &kind, &state_key)
		.await?;

	let content: JsonValue =
		serde_json::from_str(pdu.content.get()).map_err(maelstrom_core::Error::from)?;
	Ok(Json(content))
}

/// # `PUT /_matrix/client/v3/rooms/{roomId}/state/{eventType}`
///
/// state_key defaults to the empty string when the path segment is
/// absent.
pub(crate) async fn send_state_for_empty_key_route(
	State(services): State,
	Path((room_id, event_type)): Path<(OwnedRoomId, String)>,
	headers: HeaderMap,
	Json(content): Json<JsonValue>,
) -> Result<Json<JsonValue>> {
	send_state_event(services, room_id, event_type, String::new(), headers, content).await
}

/// # `PUT /_matrix/client/v3/rooms/{roomId}/state/{eventType}/{stateKey}`
pub(crate) async fn send_state_for_key_route(
	State(services): State,
	Path((room_id, event_type, state_key)): Path<(OwnedRoomId, String, String)>,
	headers: HeaderMap,
	Json(content): Json<JsonValue>,
) -> Result<Json<JsonValue>> {
	send_state_event(services, room_id, event_type, state_key, headers, content).await
}

async fn send_state_event(
	services: std::sync::Arc<maelstrom_service::Services>,
	room_id: OwnedRoomId,
	event_type: String,
	state_key: String,
	headers: HeaderMap,
	content: JsonValue,
) -> Result<Json<JsonValue>> {
	let sender = sender_user(&headers)?;

	let builder = PduBuilder {
		event_type: event_type.as_str().into(),
		content: to_raw_value(&content).map_err(maelstrom_core::Error::from)?,
		unsigned: None,
		state_key: Some(state_key),
		redacts: None,
		timestamp: None,
	};

	let (event_id, _) = services
		.timeline
		.build_and_append(&room_id, &sender, builder, &Opts::local())
		.await?;

	Ok(Json(json!({ "event_id": event_id })))
}
