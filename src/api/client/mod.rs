mod create_room;
mod initial_sync;
mod invite;
mod state;

use http::HeaderMap;
use maelstrom_core::{Error, err};
use ruma::OwnedUserId;

pub(crate) use self::{
	create_room::create_room_route,
	initial_sync::initial_sync_route,
	invite::invite_route,
	state::{
		get_state_for_empty_key_route, get_state_for_key_route, get_state_route,
		send_state_for_empty_key_route, send_state_for_key_route,
	},
};

/// The authenticated caller. Token verification happens in the access
/// layer in front of us; what reaches this router carries the resolved
/// mxid in the bearer slot.
pub(crate) fn sender_user(headers: &HeaderMap) -> Result<OwnedUserId, Error> {
	let bearer = headers
		.get(http::header::AUTHORIZATION)
		.ok_or_else(|| err!(Unauthorized("missing access credentials")))?
		.to_str()
		.map_err(|_| err!(Unauthorized("malformed access credentials")))?;

	let user_id = bearer
		.strip_prefix("Bearer ")
		.ok_or_else(|| err!(Unauthorized("unsupported authorization scheme")))?;

	user_id
		.try_into()
		.map_err(|_| err!(Unauthorized("credentials do not resolve to a user")))
}
