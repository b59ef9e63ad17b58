//! Room event authorization rules.
//!
//! Callers run these checks at three points: self-contained static checks,
//! a check against the state the event itself declares through its
//! auth_events, and a check against the actual room state at the point of
//! application. The state consulted is abstracted behind a fetch closure so
//! the same rules serve both relative checks.

mod room_member;
#[cfg(test)]
mod tests;

use std::{fmt, future::Future};

use ruma::{
	OwnedEventId, OwnedUserId, UserId,
	events::{StateEventType, TimelineEventType, room::member::MembershipState},
};
use serde::Deserialize;

use super::{
	StateKey,
	pdu::{MAX_AUTH_EVENTS, MAX_PREV_EVENTS, Pdu},
	power::RoomPower,
	room_version::RoomVersion,
};

/// A structured denial. Never surfaced as a partial commit; the pipeline
/// attaches it to logs and reports the event rejected.
#[derive(Clone, Debug)]
pub struct AuthError {
	pub rule: &'static str,
	pub msg: String,
}

impl AuthError {
	fn new(rule: &'static str, msg: impl Into<String>) -> Self {
		Self { rule, msg: msg.into() }
	}
}

impl fmt::Display for AuthError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "rejected by the {} rule: {}", self.rule, self.msg)
	}
}

pub type AuthResult = Result<(), AuthError>;

#[derive(Deserialize)]
struct CreateContent {
	creator: Option<OwnedUserId>,

	#[serde(rename = "m.federate", default = "default_federate")]
	federate: bool,

	room_version: Option<String>,
}

fn default_federate() -> bool { true }

/// Self-contained checks; failures here are unrecoverable regardless of
/// which state the event is evaluated against.
pub fn check_static(pdu: &Pdu, _rules: &RoomVersion) -> AuthResult {
	if pdu.prev_events.len() > MAX_PREV_EVENTS {
		return Err(AuthError::new("size", "too many prev_events"));
	}

	if pdu.auth_events.len() > MAX_AUTH_EVENTS {
		return Err(AuthError::new("size", "too many auth_events"));
	}

	match pdu.kind {
		| TimelineEventType::RoomCreate => {
			if pdu.state_key.as_deref() != Some("") {
				return Err(AuthError::new(
					"create",
					"m.room.create must have an empty state_key",
				));
			}

			if !pdu.prev_events.is_empty() {
				return Err(AuthError::new(
					"create",
					"m.room.create must be the first event in the room",
				));
			}

			let room_server = pdu.room_id.server_name();
			if room_server != Some(pdu.sender.server_name()) {
				return Err(AuthError::new(
					"create",
					"room_id does not belong to the sender's server",
				));
			}
		},
		| TimelineEventType::RoomMember => {
			let Some(state_key) = pdu.state_key.as_deref() else {
				return Err(AuthError::new(
					"membership",
					"m.room.member requires a state_key",
				));
			};

			if <&UserId>::try_from(state_key).is_err() {
				return Err(AuthError::new(
					"membership",
					"m.room.member state_key is not a user id",
				));
			}
		},
		| _ => {},
	}

	Ok(())
}

/// Full authorization of `pdu` against the state produced by
/// `fetch_state`. `fetch_event` resolves arbitrary events; only the
/// redaction authority rule needs it.
pub async fn check<F, Fut, E, FutE>(
	pdu: &Pdu,
	rules: &RoomVersion,
	fetch_state: &F,
	fetch_event: &E,
) -> AuthResult
where
	F: Fn(StateEventType, StateKey) -> Fut + Sync,
	Fut: Future<Output = Option<Pdu>> + Send,
	E: Fn(OwnedEventId) -> FutE + Sync,
	FutE: Future<Output = Option<Pdu>> + Send,
{
	check_static(pdu, rules)?;

	// m.room.create is valid only as the first event; everything it would
	// be checked against descends from it.
	if pdu.kind == TimelineEventType::RoomCreate {
		return check_room_create(pdu, rules);
	}

	let Some(create) = fetch_state(StateEventType::RoomCreate, StateKey::new()).await else {
		return Err(AuthError::new("create", "room has no m.room.create in auth state"));
	};

	let create_content: CreateContent = create
		.get_content()
		.map_err(|e| AuthError::new("create", format!("create content: {e}")))?;

	if !create_content.federate
		&& pdu.sender.server_name() != create.sender.server_name()
	{
		return Err(AuthError::new("federate", "room is unfederated"));
	}

	let creator = if rules.updated_rules {
		Some(create.sender.clone())
	} else {
		create_content.creator
	};

	let power_event = fetch_state(StateEventType::RoomPowerLevels, StateKey::new()).await;
	let power = RoomPower::new(power_event.as_ref().map(|e| &*e.content), creator.clone());

	if pdu.kind == TimelineEventType::RoomMember {
		return room_member::check_room_member(
			pdu,
			rules,
			&create,
			creator.as_deref(),
			&power,
			fetch_state,
		)
		.await;
	}

	// Any other event requires a joined sender.
	let sender_membership = membership_of(fetch_state, &pdu.sender).await;
	if sender_membership != MembershipState::Join {
		return Err(AuthError::new("membership", "sender is not joined to the room"));
	}

	let sender_level = power.level_user(&pdu.sender);
	let kind = pdu.kind.to_string();
	let required = power.level_event(&kind, pdu.state_key.as_deref());
	if sender_level < required {
		return Err(AuthError::new(
			"power",
			format!("sender level {sender_level} is below the required {required}"),
		));
	}

	match pdu.kind {
		| TimelineEventType::RoomPowerLevels =>
			check_power_levels(pdu, &power, sender_level),
		| TimelineEventType::RoomRedaction =>
			check_redaction(pdu, &power, sender_level, fetch_event).await,
		| _ => Ok(()),
	}
}

fn check_room_create(pdu: &Pdu, _rules: &RoomVersion) -> AuthResult {
	let content: CreateContent = pdu
		.get_content()
		.map_err(|e| AuthError::new("create", format!("create content: {e}")))?;

	if let Some(version) = &content.room_version {
		if RoomVersion::rules(version).is_err() {
			return Err(AuthError::new(
				"create",
				format!("unrecognized room version {version:?}"),
			));
		}
	}

	Ok(())
}

/// Every level altered by a new power_levels event must be within the
/// sender's own authority, coming and going.
fn check_power_levels(pdu: &Pdu, current: &RoomPower, sender_level: i64) -> AuthResult {
	let new = RoomPower::new(Some(&pdu.content), None);

	for prop in [
		"ban",
		"events_default",
		"invite",
		"kick",
		"redact",
		"state_default",
		"users_default",
	] {
		let old_level = current.level(prop);
		let new_level = new.level(prop);
		if old_level != new_level && sender_level < old_level.max(new_level) {
			return Err(AuthError::new(
				"power",
				format!("cannot move {prop} between {old_level} and {new_level}"),
			));
		}
	}

	#[derive(Deserialize)]
	struct Users {
		#[serde(default)]
		users: std::collections::BTreeMap<OwnedUserId, serde_json::Value>,
	}

	let new_users: Users = pdu
		.get_content()
		.map_err(|e| AuthError::new("power", format!("power_levels content: {e}")))?;

	for (user_id, _) in &new_users.users {
		let old_level = current.level_user(user_id);
		let new_level = new.level_user(user_id);
		if old_level == new_level {
			continue;
		}

		if sender_level < old_level.max(new_level) {
			return Err(AuthError::new(
				"power",
				format!("cannot move {user_id} between {old_level} and {new_level}"),
			));
		}

		// Demoting another user requires outranking them outright.
		if user_id != &pdu.sender && sender_level <= old_level {
			return Err(AuthError::new(
				"power",
				format!("cannot change the level of {user_id} at {old_level}"),
			));
		}
	}

	Ok(())
}

/// The sender must either hold the redact power or be redacting their own
/// event.
async fn check_redaction<E, FutE>(
	pdu: &Pdu,
	power: &RoomPower,
	sender_level: i64,
	fetch_event: &E,
) -> AuthResult
where
	E: Fn(OwnedEventId) -> FutE + Sync,
	FutE: Future<Output = Option<Pdu>> + Send,
{
	if sender_level >= power.level("redact") {
		return Ok(());
	}

	let Some(redacts) = pdu.redacts.clone() else {
		return Err(AuthError::new("redact", "redaction without a target"));
	};

	if let Some(target) = fetch_event(redacts).await {
		if target.sender == pdu.sender {
			return Ok(());
		}
	}

	Err(AuthError::new("redact", "sender may not redact this event"))
}

pub(super) async fn membership_of<F, Fut>(fetch_state: &F, user_id: &UserId) -> MembershipState
where
	F: Fn(StateEventType, StateKey) -> Fut + Sync,
	Fut: Future<Output = Option<Pdu>> + Send,
{
	match fetch_state(StateEventType::RoomMember, user_id.as_str().into()).await {
		| Some(member) => member
			.membership()
			.unwrap_or(MembershipState::Leave),
		| None => MembershipState::Leave,
	}
}
