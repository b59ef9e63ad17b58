use ruma::{RoomVersionId, owned_event_id};
use serde_json::json;

use super::*;

fn member_json(membership: &str) -> CanonicalJsonObject {
	let value = json!({
		"type": "m.room.member",
		"content": { "membership": membership },
		"room_id": "!r:example.org",
		"sender": "@alice:example.org",
		"state_key": "@alice:example.org",
		"origin_server_ts": 1_700_000_000_000_u64,
		"depth": 2,
		"prev_events": ["$JCr4DTfj9A2heE0MCzrwvRYMSAOtqvXaQcw7hGQAK3E"],
		"auth_events": ["$e0YmwnKseuHqsuF50ekjta7z5UpkrxIO6fIlPC8cJkY"],
		"hashes": { "sha256": "ThisHashCoversAllFieldsInCaseThisIsRedacted" },
	});

	let serde_json::Value::Object(map) = value else {
		unreachable!("literal is an object");
	};

	ruma::canonical_json::try_from_json_map(map).expect("literal is canonical")
}

#[test]
fn from_id_val_round_trip() {
	let event_id = owned_event_id!("$lmvljAK77HkWyUFYJDpbLUZVFHqNYs6jvbiJzPiYXqA");
	let pdu = Pdu::from_id_val(&event_id, member_json("join")).expect("deserializes");

	assert_eq!(pdu.event_id, event_id);
	assert_eq!(pdu.kind, TimelineEventType::RoomMember);
	assert_eq!(pdu.state_key.as_deref(), Some("@alice:example.org"));
	assert!(pdu.is_state());
	assert_eq!(pdu.membership().expect("content has membership"), MembershipState::Join);
}

#[test]
fn canonical_object_omits_event_id() {
	let event_id = owned_event_id!("$lmvljAK77HkWyUFYJDpbLUZVFHqNYs6jvbiJzPiYXqA");
	let pdu = Pdu::from_id_val(&event_id, member_json("join")).expect("deserializes");
	let wire = pdu.to_canonical_object().expect("serializes");

	assert!(!wire.contains_key("event_id"), "event_id is local annotation only");
	assert!(wire.contains_key("hashes"));
}

#[test]
fn canonical_json_round_trips_bytes() {
	let object = member_json("join");
	let bytes = serde_json::to_string(&object).expect("serializes");
	let reparsed: CanonicalJsonObject =
		serde_json::from_str(&bytes).expect("canonical JSON reparses");

	assert_eq!(serde_json::to_string(&reparsed).expect("serializes"), bytes);
}

#[test]
fn redaction_strips_to_allowed_keys() {
	let event_id = owned_event_id!("$lmvljAK77HkWyUFYJDpbLUZVFHqNYs6jvbiJzPiYXqA");
	let mut json = member_json("join");
	json.insert(
		"content".into(),
		ruma::canonical_json::to_canonical_value(json!({
			"membership": "join",
			"displayname": "alice",
		}))
		.expect("canonical"),
	);

	let mut pdu = Pdu::from_id_val(&event_id, json).expect("deserializes");
	let reason = pdu.clone();

	pdu.redact(&RoomVersionId::V11, &reason).expect("redacts");
	assert!(pdu.is_redacted());

	let content: serde_json::Value =
		serde_json::from_str(pdu.content.get()).expect("content parses");
	assert_eq!(content.get("membership").and_then(|m| m.as_str()), Some("join"));
	assert!(content.get("displayname").is_none(), "displayname is not protected");
}

#[test]
fn equality_is_by_event_id() {
	let event_id = owned_event_id!("$lmvljAK77HkWyUFYJDpbLUZVFHqNYs6jvbiJzPiYXqA");
	let a = Pdu::from_id_val(&event_id, member_json("join")).expect("deserializes");
	let b = Pdu::from_id_val(&event_id, member_json("leave")).expect("deserializes");

	assert_eq!(a, b, "same id compares equal regardless of content");
}
