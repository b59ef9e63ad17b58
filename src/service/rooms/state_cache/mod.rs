use std::sync::Arc;

use maelstrom_core::{Pdu, Result, err, implement, utils};
use maelstrom_database::{Batch, Map, key3, keyval, split3};
use ruma::{
	OwnedUserId, RoomId, ServerName, UserId, events::room::member::MembershipState,
};

use super::EventIdx;
use crate::service;

/// The joined-members fast path. One column keyed by (room, origin, user)
/// mirrors the m.room.member join entries of present state; it is updated
/// in the same commit batch as the state columns and is only valid for
/// present-mode queries. Historical membership goes through the state
/// space instead.
pub struct Service {
	db: Data,
	services: Arc<crate::OnceServices>,
}

struct Data {
	room_joined: Arc<Map>,
}

impl crate::Service for Service {
	fn build(args: &crate::Args<'_>) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			db: Data { room_joined: args.db["room_joined"].clone() },
			services: args.services.clone(),
		}))
	}

	fn name(&self) -> &str { service::make_name(std::module_path!()) }
}

/// Track a membership transition inside the commit batch of its event.
#[implement(Service)]
pub fn update_membership(&self, batch: &mut Batch, pdu: &Pdu, idx: EventIdx) -> Result {
	if pdu.kind != ruma::events::TimelineEventType::RoomMember {
		return Ok(());
	}

	let Some(state_key) = pdu.state_key.as_deref() else {
		return Ok(());
	};

	let user: &UserId = state_key
		.try_into()
		.map_err(|e| err!(Conform("member state_key is not a user id: {e}")))?;

	let key = key3(pdu.room_id.as_str(), user.server_name().as_str(), user.as_str());

	match pdu.membership()? {
		| MembershipState::Join => batch.set(&self.db.room_joined, key, utils::u64_to_u8(idx)),
		| _ => batch.del(&self.db.room_joined, key),
	}

	Ok(())
}

#[implement(Service)]
pub async fn is_joined(&self, user_id: &UserId, room_id: &RoomId) -> bool {
	let key = key3(
		room_id.as_str(),
		user_id.server_name().as_str(),
		user_id.as_str(),
	);

	self.db.room_joined.exists(key).await
}

/// All joined members of a room, ordered by origin.
#[implement(Service)]
pub fn room_members<'a>(
	&'a self,
	room_id: &RoomId,
) -> impl Iterator<Item = Result<OwnedUserId>> + 'a {
	let prefix = keyval::prefix(&[room_id.as_str()]);
	self.db.room_joined.iter_prefix(&prefix).map(|item| {
		let (key, _) = item?;
		let (_, _, user) = split3(&key)?;
		user.try_into()
			.map_err(|e| err!(Database("joined column holds a bad user id: {e}")))
	})
}

/// Joined members from one origin.
#[implement(Service)]
pub fn room_members_of<'a>(
	&'a self,
	room_id: &RoomId,
	origin: &ServerName,
) -> impl Iterator<Item = Result<OwnedUserId>> + 'a {
	let prefix = keyval::prefix(&[room_id.as_str(), origin.as_str()]);
	self.db.room_joined.iter_prefix(&prefix).map(|item| {
		let (key, _) = item?;
		let (_, _, user) = split3(&key)?;
		user.try_into()
			.map_err(|e| err!(Database("joined column holds a bad user id: {e}")))
	})
}

/// Origins with at least one joined member; each yielded once.
#[implement(Service)]
pub fn room_servers<'a>(
	&'a self,
	room_id: &RoomId,
) -> impl Iterator<Item = Result<String>> + 'a {
	let prefix = keyval::prefix(&[room_id.as_str()]);
	let mut last: Option<String> = None;

	self.db
		.room_joined
		.iter_prefix(&prefix)
		.filter_map(move |item| {
			let parsed = item.and_then(|(key, _)| {
				let (_, origin, _) = split3(&key)?;
				Ok(origin.to_owned())
			});

			match parsed {
				| Ok(origin) if last.as_deref() == Some(origin.as_str()) => None,
				| Ok(origin) => {
					last = Some(origin.clone());
					Some(Ok(origin))
				},
				| Err(e) => Some(Err(e)),
			}
		})
}

/// Whether any local user is joined.
#[implement(Service)]
pub async fn local_joined(&self, room_id: &RoomId) -> bool {
	self.room_members_of(room_id, self.services.globals.server_name())
		.next()
		.is_some()
}

/// Whether any remote user is joined.
#[implement(Service)]
pub async fn remote_joined(&self, room_id: &RoomId) -> bool {
	let ours = self.services.globals.server_name().as_str();

	self.room_servers(room_id)
		.filter_map(Result::ok)
		.any(|origin| origin != ours)
}

#[implement(Service)]
pub fn joined_count(&self, room_id: &RoomId) -> usize {
	self.room_members(room_id)
		.filter(Result::is_ok)
		.count()
}

#[implement(Service)]
pub async fn server_in_room(&self, server: &ServerName, room_id: &RoomId) -> bool {
	self.room_members_of(room_id, server).next().is_some()
}
