use std::sync::Arc;

use axum::{
	Json, Router,
	response::{IntoResponse, Response},
	routing::{get, post, put},
};
use maelstrom_core::Error;
use maelstrom_service::Services;
use serde_json::json;
use tracing::debug;

use crate::{client, server};

pub fn build(services: Arc<Services>) -> Router {
	Router::new()
		// client
		.route("/_matrix/client/v3/createRoom", post(client::create_room_route))
		.route("/_matrix/client/v3/rooms/{room_id}/state", get(client::get_state_route))
		.route(
			"/_matrix/client/v3/rooms/{room_id}/state/{event_type}",
			get(client::get_state_for_empty_key_route).put(client::send_state_for_empty_key_route),
		)
		.route(
			"/_matrix/client/v3/rooms/{room_id}/state/{event_type}/{state_key}",
			get(client::get_state_for_key_route).put(client::send_state_for_key_route),
		)
		.route(
			"/_matrix/client/v3/rooms/{room_id}/initialSync",
			get(client::initial_sync_route),
		)
		.route("/_matrix/client/v3/rooms/{room_id}/invite", post(client::invite_route))
		// federation
		.route(
			"/_matrix/federation/v1/backfill_ids/{room_id}",
			get(server::backfill_ids_route),
		)
		.route(
			"/_matrix/federation/v1/event_auth/{room_id}/{event_id}",
			get(server::event_auth_route),
		)
		.route(
			"/_matrix/federation/v1/invite/{room_id}/{event_id}",
			put(server::invite_route),
		)
		.with_state(services)
}

/// Error surface of every route; the core error mapped to its HTTP status
/// with the Matrix errcode in the body.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
	fn from(e: Error) -> Self { Self(e) }
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let error = self.0;
		debug!("request failed: {error:?}");

		let body = Json(json!({
			"errcode": error.errcode(),
			"error": error.sanitized_message(),
		}));

		(error.status_code(), body).into_response()
	}
}
