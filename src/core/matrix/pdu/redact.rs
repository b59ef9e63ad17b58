use ruma::{RoomVersionId, events::TimelineEventType};
use serde_json::{Value as JsonValue, value::to_raw_value};

use super::Pdu;
use crate::{Result, err};

impl Pdu {
	/// Strip non-essential content in place after an accepted redaction.
	/// The reason event is recorded under unsigned so the target can be
	/// served in its redacted form.
	pub fn redact(&mut self, room_version: &RoomVersionId, reason: &Self) -> Result {
		let content: JsonValue = serde_json::from_str(self.content.get())?;
		let JsonValue::Object(content) = content else {
			return Err(err!(Conform("PDU content is not an object")));
		};

		let kept: serde_json::Map<String, JsonValue> =
			match kept_content_keys(&self.kind, room_version) {
				| Keep::All => content,
				| Keep::Keys(keys) => content
					.into_iter()
					.filter(|(key, _)| keys.contains(&key.as_str()))
					.collect(),
			};

		self.content = to_raw_value(&kept)?;
		self.unsigned = Some(to_raw_value(&serde_json::json!({
			"redacted_because": reason.to_room_event(),
		}))?);

		Ok(())
	}

	/// Whether this event has already been through `redact`.
	#[must_use]
	pub fn is_redacted(&self) -> bool {
		let Some(unsigned) = &self.unsigned else {
			return false;
		};

		serde_json::from_str::<JsonValue>(unsigned.get())
			.is_ok_and(|u| u.get("redacted_because").is_some())
	}
}

enum Keep {
	All,
	Keys(&'static [&'static str]),
}

/// Content keys which survive redaction for each event type, per room
/// version.
fn kept_content_keys(kind: &TimelineEventType, room_version: &RoomVersionId) -> Keep {
	use RoomVersionId::{V1, V2, V3, V4, V5, V6, V7, V8, V9, V10};

	let updated_rules =
		!matches!(room_version, V1 | V2 | V3 | V4 | V5 | V6 | V7 | V8 | V9 | V10);

	match kind {
		| TimelineEventType::RoomMember => Keep::Keys(&["membership"]),
		| TimelineEventType::RoomCreate if updated_rules => Keep::All,
		| TimelineEventType::RoomCreate => Keep::Keys(&["creator"]),
		| TimelineEventType::RoomJoinRules => Keep::Keys(&["join_rule", "allow"]),
		| TimelineEventType::RoomPowerLevels => Keep::Keys(&[
			"ban",
			"events",
			"events_default",
			"invite",
			"kick",
			"redact",
			"state_default",
			"users",
			"users_default",
		]),
		| TimelineEventType::RoomHistoryVisibility => Keep::Keys(&["history_visibility"]),
		| TimelineEventType::RoomRedaction if updated_rules => Keep::Keys(&["redacts"]),
		| _ => Keep::Keys(&[]),
	}
}
