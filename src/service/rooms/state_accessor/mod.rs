mod view;

use std::sync::Arc;

use maelstrom_core::{
	Pdu, Result, err, implement,
	matrix::{RoomVersion, power::RoomPower},
	utils,
};
use maelstrom_database::{Map, key3, keyval, split_u64_tail, trim_sep};
use ruma::{
	EventId, RoomId, RoomVersionId, ServerName, UserId,
	events::{StateEventType, room::member::MembershipState},
};
use serde::Deserialize;

pub use self::view::RoomView;
use super::EventIdx;
use crate::service;

/// Read side of room state: the present-state column for O(1) lookups and
/// the state space for queries anchored at a historical point.
pub struct Service {
	db: Data,
	services: Arc<crate::OnceServices>,
}

struct Data {
	room_state: Arc<Map>,
	room_state_space: Arc<Map>,
}

#[derive(Deserialize)]
struct ExtractCreate {
	creator: Option<ruma::OwnedUserId>,
	room_version: Option<String>,
}

#[derive(Deserialize)]
struct ExtractHistoryVisibility {
	history_visibility: Option<String>,
}

impl crate::Service for Service {
	fn build(args: &crate::Args<'_>) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			db: Data {
				room_state: args.db["room_state"].clone(),
				room_state_space: args.db["room_state_space"].clone(),
			},
			services: args.services.clone(),
		}))
	}

	fn name(&self) -> &str { service::make_name(std::module_path!()) }
}

/// Present-state lookup; one key read.
#[implement(Service)]
pub async fn state_get_idx(
	&self,
	room_id: &RoomId,
	kind: &StateEventType,
	state_key: &str,
) -> Result<EventIdx> {
	let key = key3(room_id.as_str(), &kind.to_string(), state_key);
	let val = self.db.room_state.get(key).await?;

	utils::checked_u64_from_u8(&val)
}

#[implement(Service)]
pub async fn state_get(
	&self,
	room_id: &RoomId,
	kind: &StateEventType,
	state_key: &str,
) -> Result<Pdu> {
	let idx = self.state_get_idx(room_id, kind, state_key).await?;
	self.services.timeline.get_pdu_from_idx(idx).await
}

#[implement(Service)]
pub async fn state_get_content<T>(
	&self,
	room_id: &RoomId,
	kind: &StateEventType,
	state_key: &str,
) -> Result<T>
where
	T: for<'de> Deserialize<'de>,
{
	self.state_get(room_id, kind, state_key)
		.await?
		.get_content()
}

/// Present state of the whole room, ordered by (type, state_key).
#[implement(Service)]
pub fn state_full<'a>(
	&'a self,
	room_id: &RoomId,
) -> impl Iterator<Item = Result<(String, String, EventIdx)>> + 'a {
	let prefix = keyval::prefix(&[room_id.as_str()]);
	self.db.room_state.iter_prefix(&prefix).map(move |item| {
		let (key, val) = item?;
		let rest = &key[prefix_len(&key)?..];
		let (kind, state_key) = maelstrom_database::split2(rest)?;

		Ok((kind.to_owned(), state_key.to_owned(), utils::checked_u64_from_u8(&val)?))
	})
}

fn prefix_len(key: &[u8]) -> Result<usize> {
	key.iter()
		.position(|&b| b == maelstrom_database::SEP)
		.map(|pos| pos.saturating_add(1))
		.ok_or_else(|| err!(Database("state key missing a room segment")))
}

/// Highest-depth state entry at or below the ceiling for one
/// (type, state_key); the anchored-mode point query.
#[implement(Service)]
pub async fn state_get_idx_at(
	&self,
	room_id: &RoomId,
	at_depth: u64,
	kind: &StateEventType,
	state_key: &str,
) -> Result<EventIdx> {
	if !self.services.server.config.state_enable_history {
		return Err(err!(NotFound("historical state queries are disabled")));
	}

	let prefix = keyval::prefix(&[room_id.as_str(), &kind.to_string(), state_key]);

	let mut from = prefix.clone();
	keyval::push_u64(&mut from, at_depth);
	keyval::push_u64(&mut from, u64::MAX);

	if self.services.server.config.state_readahead_size > 0 {
		self.db.room_state_space.prefetch(&prefix);
	}

	let entry = self
		.db
		.room_state_space
		.rev_iter_from_prefix(&prefix, &from)
		.next()
		.transpose()?
		.ok_or_else(|| {
			err!(NotFound("no {kind} state at or below depth {at_depth} in {room_id}"))
		})?;

	let (key, _) = entry;
	let (_, idx) = split_u64_tail(&key)?;
	Ok(idx)
}

/// Full state mapping at a depth ceiling. One ordered walk of the room's
/// state space, emitting the deepest qualifying entry per (type,
/// state_key); relies on the column ordering by type, state_key, depth.
#[implement(Service)]
pub async fn state_full_at(
	&self,
	room_id: &RoomId,
	at_depth: u64,
) -> Result<Vec<(String, String, EventIdx)>> {
	if !self.services.server.config.state_enable_history {
		return Err(err!(NotFound("historical state queries are disabled")));
	}

	let prefix = keyval::prefix(&[room_id.as_str()]);
	let mut out: Vec<(String, String, EventIdx)> = Vec::new();
	let mut current: Option<(String, String, EventIdx)> = None;

	for item in self.db.room_state_space.iter_prefix(&prefix) {
		let (key, _) = item?;
		let rest = &key[prefix_len(&key)?..];

		let (head, idx) = split_u64_tail(rest)?;
		let (head, depth) = split_u64_tail(head)?;
		let (kind, state_key) = maelstrom_database::split2(trim_sep(head))?;

		if depth > at_depth {
			continue;
		}

		match &mut current {
			| Some((cur_kind, cur_key, cur_idx))
				if cur_kind.as_str() == kind && cur_key.as_str() == state_key =>
			{
				// Deeper entry for the same pair supersedes.
				*cur_idx = idx;
			},
			| _ => {
				if let Some(done) = current.take() {
					out.push(done);
				}
				current = Some((kind.to_owned(), state_key.to_owned(), idx));
			},
		}
	}

	if let Some(done) = current.take() {
		out.push(done);
	}

	Ok(out)
}

/// Whether the room exists at all: it does once an m.room.create is
/// present state. Every state query on an absent room reports NotFound
/// through the same path.
#[implement(Service)]
pub async fn exists(&self, room_id: &RoomId) -> bool {
	self.state_get_idx(room_id, &StateEventType::RoomCreate, "")
		.await
		.is_ok()
}

#[implement(Service)]
pub async fn get_create(&self, room_id: &RoomId) -> Result<Pdu> {
	self.state_get(room_id, &StateEventType::RoomCreate, "")
		.await
}

#[implement(Service)]
pub async fn room_version(&self, room_id: &RoomId) -> Result<RoomVersionId> {
	let create: ExtractCreate = self
		.get_create(room_id)
		.await?
		.get_content()?;

	let version = create
		.room_version
		.unwrap_or_else(|| RoomVersion::DEFAULT.to_owned());

	RoomVersionId::try_from(version.as_str()).map_err(Into::into)
}

/// The effective power levels of the room, with creator defaulting, even
/// when no power_levels state exists.
#[implement(Service)]
pub async fn get_power(&self, room_id: &RoomId) -> Result<RoomPower> {
	let create = self.get_create(room_id).await?;
	let create_content: ExtractCreate = create.get_content()?;

	let version = create_content
		.room_version
		.as_deref()
		.unwrap_or(RoomVersion::DEFAULT);
	let rules = RoomVersion::rules(version)?;

	let creator = if rules.updated_rules {
		Some(create.sender.clone())
	} else {
		create_content.creator
	};

	let power_event = self
		.state_get(room_id, &StateEventType::RoomPowerLevels, "")
		.await
		.ok();

	Ok(RoomPower::new(power_event.as_ref().map(|e| &*e.content), creator))
}

#[implement(Service)]
pub async fn get_member(&self, room_id: &RoomId, user_id: &UserId) -> Result<Pdu> {
	self.state_get(room_id, &StateEventType::RoomMember, user_id.as_str())
		.await
}

#[implement(Service)]
pub async fn user_membership(&self, room_id: &RoomId, user_id: &UserId) -> MembershipState {
	let Ok(idx) = self
		.state_get_idx(room_id, &StateEventType::RoomMember, user_id.as_str())
		.await
	else {
		return MembershipState::Leave;
	};

	self.services
		.timeline
		.get_membership(idx)
		.await
		.unwrap_or(MembershipState::Leave)
}

#[implement(Service)]
pub async fn history_visibility(&self, room_id: &RoomId) -> String {
	self.state_get_content(room_id, &StateEventType::RoomHistoryVisibility, "")
		.await
		.ok()
		.and_then(|c: ExtractHistoryVisibility| c.history_visibility)
		.unwrap_or_else(|| "shared".to_owned())
}

#[implement(Service)]
pub async fn is_world_readable(&self, room_id: &RoomId) -> bool {
	self.history_visibility(room_id).await == "world_readable"
}

/// Whether a user may read the room's events under the present history
/// visibility.
#[implement(Service)]
pub async fn user_can_see_events(&self, user_id: &UserId, room_id: &RoomId) -> bool {
	match self.user_membership(room_id, user_id).await {
		| MembershipState::Join => true,
		| MembershipState::Invite => {
			let visibility = self.history_visibility(room_id).await;
			visibility == "invited" || visibility == "world_readable"
		},
		| _ => self.is_world_readable(room_id).await,
	}
}

#[implement(Service)]
pub async fn user_can_see_state(&self, user_id: &UserId, room_id: &RoomId) -> bool {
	self.user_can_see_events(user_id, room_id).await
}

/// Whether a remote server has visibility: any of its users joined, or
/// the room world-readable.
#[implement(Service)]
pub async fn server_can_see(&self, server: &ServerName, room_id: &RoomId) -> bool {
	if self.services.globals.server_is_ours(server) {
		return true;
	}

	self.services
		.state_cache
		.server_in_room(server, room_id)
		.await
		|| self.is_world_readable(room_id).await
}

/// Open a resolver view at the present tip or anchored at an event.
#[implement(Service)]
pub async fn view(&self, room_id: &RoomId, anchor: Option<&EventId>) -> Result<RoomView<'_>> {
	RoomView::open(self, room_id, anchor).await
}

#[derive(Deserialize)]
struct ExtractServerAcl {
	#[serde(default)]
	allow: Vec<String>,

	#[serde(default)]
	deny: Vec<String>,
}

/// Evaluate the room's server ACL for an origin. Rooms without the state
/// allow everyone; deny wins over allow; an empty allow list denies.
#[implement(Service)]
pub async fn server_acl_allows(&self, room_id: &RoomId, server: &ServerName) -> bool {
	let Ok(acl) = self
		.state_get_content::<ExtractServerAcl>(room_id, &StateEventType::RoomServerAcl, "")
		.await
	else {
		return true;
	};

	let name = server.as_str();

	if acl.deny.iter().any(|pattern| glob_match(pattern, name)) {
		return false;
	}

	acl.allow
		.iter()
		.any(|pattern| glob_match(pattern, name))
}

/// Matches '*' against any sequence and '?' against a single character,
/// the dialect server ACL patterns use.
fn glob_match(pattern: &str, name: &str) -> bool {
	fn inner(pattern: &[u8], name: &[u8]) -> bool {
		match (pattern.first(), name.first()) {
			| (None, None) => true,
			| (Some(b'*'), _) =>
				inner(&pattern[1..], name)
					|| (!name.is_empty() && inner(pattern, &name[1..])),
			| (Some(b'?'), Some(_)) => inner(&pattern[1..], &name[1..]),
			| (Some(p), Some(n)) if p == n => inner(&pattern[1..], &name[1..]),
			| _ => false,
		}
	}

	inner(pattern.as_bytes(), name.as_bytes())
}

#[cfg(test)]
mod tests {
	use super::glob_match;

	#[test]
	fn acl_globs() {
		assert!(glob_match("*", "example.org"));
		assert!(glob_match("*.example.org", "matrix.example.org"));
		assert!(!glob_match("*.example.org", "example.org"));
		assert!(glob_match("example.org", "example.org"));
		assert!(glob_match("examp?e.org", "example.org"));
		assert!(!glob_match("evil.example", "example.org"));
	}
}
