//! View over the room's power levels.
//!
//! The power_levels state event contains integer thresholds for privileges
//! in the room and a map of users to levels. This view hides the details of
//! that event behind single operations, supplementing spec defaults so
//! queries always produce a result: when no power_levels event exists the
//! defaults apply, and a known room creator receives the creator default.
//!
//! When determining power to change a state event rather than a non-state
//! event the state_key must always be given. `None` means the query is for
//! a non-state event; it is not the same as `Some("")`, which is the common
//! legitimate empty state key.

use std::collections::BTreeMap;

use ruma::{OwnedUserId, UserId};
use serde::Deserialize;
use serde_json::{Value as JsonValue, value::RawValue as RawJsonValue};

pub const CREATOR_LEVEL: i64 = 100;
pub const DEFAULT_LEVEL: i64 = 50;
pub const DEFAULT_EVENT_LEVEL: i64 = 0;
pub const DEFAULT_USER_LEVEL: i64 = 0;

#[derive(Clone, Debug, Default, Deserialize)]
struct Content {
	#[serde(default)]
	events: BTreeMap<String, JsonValue>,

	#[serde(default)]
	users: BTreeMap<OwnedUserId, JsonValue>,

	#[serde(flatten)]
	levels: BTreeMap<String, JsonValue>,
}

#[derive(Clone, Debug, Default)]
pub struct RoomPower {
	content: Option<Content>,
	creator: Option<OwnedUserId>,
}

impl RoomPower {
	/// View over an existing power_levels event content; absent when the
	/// room has none.
	#[must_use]
	pub fn new(content: Option<&RawJsonValue>, creator: Option<OwnedUserId>) -> Self {
		let content =
			content.and_then(|content| serde_json::from_str::<Content>(content.get()).ok());

		Self { content, creator }
	}

	/// True for allow; false for deny. Queries the level required for
	/// `prop` when given, otherwise for sending an event of `kind`.
	#[must_use]
	pub fn allow(
		&self,
		user_id: &UserId,
		prop: Option<&str>,
		kind: Option<&str>,
		state_key: Option<&str>,
	) -> bool {
		let required = match (prop, kind) {
			| (Some(prop), _) => self.level(prop),
			| (None, Some(kind)) => self.level_event(kind, state_key),
			| (None, None) => DEFAULT_LEVEL,
		};

		self.level_user(user_id) >= required
	}

	/// The effective level of a user, with full defaulting logic.
	#[must_use]
	pub fn level_user(&self, user_id: &UserId) -> i64 {
		if let Some(level) = self
			.content
			.as_ref()
			.and_then(|c| c.users.get(user_id))
			.and_then(as_level)
		{
			return level;
		}

		if self.content.is_none() && self.creator.as_deref() == Some(user_id) {
			return CREATOR_LEVEL;
		}

		self.level_or("users_default", DEFAULT_USER_LEVEL)
	}

	/// The level required to send an event of `kind`. A missing state_key
	/// queries as if for a message event; an empty one is a real state key.
	#[must_use]
	pub fn level_event(&self, kind: &str, state_key: Option<&str>) -> i64 {
		if let Some(level) = self
			.content
			.as_ref()
			.and_then(|c| c.events.get(kind))
			.and_then(as_level)
		{
			return level;
		}

		if state_key.is_some() {
			self.level_or("state_default", DEFAULT_LEVEL)
		} else {
			self.level_or("events_default", DEFAULT_EVENT_LEVEL)
		}
	}

	/// The threshold of a named property (ban, kick, redact, invite, ...).
	#[must_use]
	pub fn level(&self, prop: &str) -> i64 {
		let fallback = match prop {
			| "users_default" => DEFAULT_USER_LEVEL,
			| "events_default" => DEFAULT_EVENT_LEVEL,
			| _ => DEFAULT_LEVEL,
		};

		self.level_or(prop, fallback)
	}

	#[must_use]
	pub fn has_user(&self, user_id: &UserId) -> bool {
		self.content
			.as_ref()
			.is_some_and(|c| c.users.contains_key(user_id))
	}

	#[must_use]
	pub fn has_event(&self, kind: &str) -> bool {
		self.content
			.as_ref()
			.is_some_and(|c| c.events.contains_key(kind))
	}

	#[must_use]
	pub fn has_level(&self, prop: &str) -> bool {
		self.content
			.as_ref()
			.is_some_and(|c| c.levels.contains_key(prop))
	}

	fn level_or(&self, prop: &str, fallback: i64) -> i64 {
		self.content
			.as_ref()
			.and_then(|c| c.levels.get(prop))
			.and_then(as_level)
			.unwrap_or(fallback)
	}
}

/// Levels are integers, but long-lived rooms contain them as strings too.
fn as_level(value: &JsonValue) -> Option<i64> {
	match value {
		| JsonValue::Number(n) => n.as_i64(),
		| JsonValue::String(s) => s.parse().ok(),
		| _ => None,
	}
}

#[cfg(test)]
mod tests {
	use ruma::{UserId, user_id};
	use serde_json::value::to_raw_value;

	use super::*;

	fn power(content: serde_json::Value, creator: Option<&UserId>) -> RoomPower {
		let raw = to_raw_value(&content).expect("literal serializes");
		RoomPower::new(Some(&raw), creator.map(ToOwned::to_owned))
	}

	#[test]
	fn absent_event_defaults() {
		let creator = user_id!("@alice:example.org");
		let view = RoomPower::new(None, Some(creator.to_owned()));

		assert_eq!(view.level_user(creator), CREATOR_LEVEL);
		assert_eq!(view.level_user(user_id!("@carol:example.org")), DEFAULT_USER_LEVEL);
		assert_eq!(view.level_event("m.room.topic", Some("")), DEFAULT_LEVEL);
		assert_eq!(view.level_event("m.room.message", None), DEFAULT_EVENT_LEVEL);
	}

	#[test]
	fn users_map_overrides_defaults() {
		let alice = user_id!("@alice:example.org");
		let view = power(
			serde_json::json!({
				"users": { "@alice:example.org": 100 },
				"users_default": 5,
			}),
			Some(alice),
		);

		assert_eq!(view.level_user(alice), 100);
		assert_eq!(view.level_user(user_id!("@carol:example.org")), 5);
		assert!(view.has_user(alice));
		assert!(!view.has_user(user_id!("@carol:example.org")));
	}

	#[test]
	fn stringly_levels_are_tolerated() {
		let view = power(serde_json::json!({ "state_default": "75" }), None);
		assert_eq!(view.level("state_default"), 75);
	}

	#[test]
	fn events_override_beats_state_default() {
		let view = power(
			serde_json::json!({
				"events": { "m.room.name": 25 },
				"state_default": 50,
			}),
			None,
		);

		assert_eq!(view.level_event("m.room.name", Some("")), 25);
		assert_eq!(view.level_event("m.room.topic", Some("")), 50);
		assert!(view.has_event("m.room.name"));
	}

	#[test]
	fn undefined_state_key_means_message_event() {
		let view = power(
			serde_json::json!({
				"events_default": 1,
				"state_default": 50,
			}),
			None,
		);

		// Some("") is a legitimate empty state key; None is not the same.
		assert_eq!(view.level_event("m.custom", Some("")), 50);
		assert_eq!(view.level_event("m.custom", None), 1);
	}

	#[test]
	fn denial_of_default_user_for_state() {
		let carol = user_id!("@carol:example.org");
		let view = power(
			serde_json::json!({ "users": { "@alice:example.org": 100 } }),
			Some(user_id!("@alice:example.org")),
		);

		assert!(!view.allow(carol, None, Some("m.room.topic"), Some("")));
		assert!(view.allow(carol, None, Some("m.room.message"), None));
	}
}
