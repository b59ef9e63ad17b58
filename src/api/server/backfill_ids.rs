use axum::{
	Json,
	extract::{Path, Query},
};
use http::HeaderMap;
use maelstrom_core::err;
use ruma::{OwnedEventId, OwnedRoomId};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use super::origin;
use crate::{Result, State};

#[derive(Deserialize)]
pub(crate) struct BackfillQuery {
	/// Event id to page backwards from; the room head when absent.
	v: Option<OwnedEventId>,

	limit: Option<usize>,
}

/// # `GET /_matrix/federation/v1/backfill_ids/{roomId}`
///
/// Event ids walking the room backwards in depth order from `v`.
pub(crate) async fn backfill_ids_route(
	State(services): State,
	Path(room_id): Path<OwnedRoomId>,
	Query(query): Query<BackfillQuery>,
	headers: HeaderMap,
) -> Result<Json<JsonValue>> {
	let origin = origin(&headers)?;

	if !services
		.state_accessor
		.server_acl_allows(&room_id, &origin)
		.await
	{
		return Err(err!(AccessDenied(
			"you are not permitted by the room's server access control list"
		))
		.into());
	}

	if !services
		.state_accessor
		.server_can_see(&origin, &room_id)
		.await
	{
		return Err(
			err!(AccessDenied("you are not permitted to view the room at this event")).into(),
		);
	}

	let config = &services.server.config;
	let limit = query
		.limit
		.unwrap_or(config.backfill_ids_limit_default)
		.min(config.backfill_ids_limit_max);

	let from_depth = match &query.v {
		| Some(event_id) => {
			let idx = services.short.get_idx(event_id).await?;
			Some(services.timeline.get_depth(idx).await?)
		},
		| None => None,
	};

	let walk: Vec<(u64, u64)> = services
		.timeline
		.pdus_rev(&room_id, from_depth)
		.take(limit)
		.collect::<maelstrom_core::Result<_>>()?;

	let mut pdu_ids = Vec::with_capacity(walk.len());
	for (_, idx) in walk {
		pdu_ids.push(services.short.get_eventid(idx).await?);
	}

	Ok(Json(json!({ "pdu_ids": pdu_ids })))
}
