use axum::Json;
use http::HeaderMap;
use maelstrom_service::rooms::event_handler::CreateOpts;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use super::sender_user;
use crate::{Result, State};

#[derive(Deserialize)]
pub(crate) struct CreateRoomBody {
	room_version: Option<String>,

	#[serde(rename = "m.federate", default = "default_federate")]
	federate: bool,
}

fn default_federate() -> bool { true }

/// # `POST /_matrix/client/v3/createRoom`
pub(crate) async fn create_room_route(
	State(services): State,
	headers: HeaderMap,
	Json(body): Json<CreateRoomBody>,
) -> Result<Json<JsonValue>> {
	let sender = sender_user(&headers)?;

	let room_id = services
		.create
		.create_room(&sender, CreateOpts {
			room_version: body.room_version,
			federate: body.federate,
		})
		.await?;

	Ok(Json(json!({ "room_id": room_id })))
}
