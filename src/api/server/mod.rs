mod backfill_ids;
mod event_auth;
mod invite;

use http::HeaderMap;
use maelstrom_core::{Error, err};
use ruma::OwnedServerName;

pub(crate) use self::{
	backfill_ids::backfill_ids_route, event_auth::event_auth_route, invite::invite_route,
};

/// The requesting server. The transport in front of us has already
/// verified the request signature against this origin; here we only read
/// the claim out of the X-Matrix scheme.
pub(crate) fn origin(headers: &HeaderMap) -> Result<OwnedServerName, Error> {
	let authorization = headers
		.get(http::header::AUTHORIZATION)
		.ok_or_else(|| err!(Unauthorized("missing X-Matrix authorization")))?
		.to_str()
		.map_err(|_| err!(Unauthorized("malformed X-Matrix authorization")))?;

	let params = authorization
		.strip_prefix("X-Matrix ")
		.ok_or_else(|| err!(Unauthorized("unsupported authorization scheme")))?;

	params
		.split(',')
		.map(str::trim)
		.find_map(|param| param.strip_prefix("origin="))
		.map(|origin| origin.trim_matches('"'))
		.ok_or_else(|| err!(Unauthorized("X-Matrix authorization names no origin")))?
		.try_into()
		.map_err(|_| err!(Unauthorized("X-Matrix origin is not a server name")))
}
