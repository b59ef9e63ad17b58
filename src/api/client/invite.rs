use axum::{Json, extract::Path};
use http::HeaderMap;
use ruma::{OwnedRoomId, OwnedUserId};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use super::sender_user;
use crate::{Result, State};

#[derive(Deserialize)]
pub(crate) struct InviteBody {
	user_id: OwnedUserId,
}

/// # `POST /_matrix/client/v3/rooms/{roomId}/invite`
pub(crate) async fn invite_route(
	State(services): State,
	Path(room_id): Path<OwnedRoomId>,
	headers: HeaderMap,
	Json(body): Json<InviteBody>,
) -> Result<Json<JsonValue>> {
	let sender = sender_user(&headers)?;

	services
		.timeline
		.invite(&room_id, &sender, &body.user_id)
		.await?;

	Ok(Json(json!({})))
}
