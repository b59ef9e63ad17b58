use std::{collections::HashMap, sync::Arc};

use ruma::{OwnedEventId, events::StateEventType, owned_event_id, user_id};
use serde_json::json;

use super::*;
use crate::matrix::{StateKey, pdu::Pdu, room_version::RoomVersion};

type StateMap = Arc<HashMap<(StateEventType, String), Pdu>>;
type EventMap = Arc<HashMap<OwnedEventId, Pdu>>;

fn pdu(value: serde_json::Value) -> Pdu {
	serde_json::from_value(value).expect("literal PDU deserializes")
}

fn event(
	event_id: &str,
	kind: &str,
	sender: &str,
	state_key: Option<&str>,
	content: serde_json::Value,
	prev_events: serde_json::Value,
) -> Pdu {
	let mut value = json!({
		"event_id": event_id,
		"type": kind,
		"content": content,
		"room_id": "!r1:example.org",
		"sender": sender,
		"origin_server_ts": 1_700_000_000_000_u64,
		"depth": 1,
		"prev_events": prev_events,
		"auth_events": [],
		"hashes": { "sha256": "ThisHashCoversAllFieldsInCaseThisIsRedacted" },
	});

	if let Some(state_key) = state_key {
		value["state_key"] = json!(state_key);
	}

	pdu(value)
}

fn create_event() -> Pdu {
	event(
		"$createcreatecreatecreatecreatecreatecreate",
		"m.room.create",
		"@alice:example.org",
		Some(""),
		json!({ "room_version": "11" }),
		json!([]),
	)
}

fn base_state() -> HashMap<(StateEventType, String), Pdu> {
	let mut state = HashMap::new();
	state.insert((StateEventType::RoomCreate, String::new()), create_event());
	state.insert(
		(StateEventType::RoomPowerLevels, String::new()),
		event(
			"$powerpowerpowerpowerpowerpowerpowerpower12",
			"m.room.power_levels",
			"@alice:example.org",
			Some(""),
			json!({ "users": { "@alice:example.org": 100 } }),
			json!(["$createcreatecreatecreatecreatecreatecreate"]),
		),
	);
	state.insert(
		(StateEventType::RoomMember, "@alice:example.org".to_owned()),
		event(
			"$alicejoinalicejoinalicejoinalicejoin1234567",
			"m.room.member",
			"@alice:example.org",
			Some("@alice:example.org"),
			json!({ "membership": "join" }),
			json!(["$createcreatecreatecreatecreatecreatecreate"]),
		),
	);

	state
}

fn fetchers(
	state: HashMap<(StateEventType, String), Pdu>,
	events: HashMap<OwnedEventId, Pdu>,
) -> (
	impl Fn(StateEventType, StateKey) -> futures::future::Ready<Option<Pdu>> + Sync,
	impl Fn(OwnedEventId) -> futures::future::Ready<Option<Pdu>> + Sync,
) {
	let state: StateMap = Arc::new(state);
	let events: EventMap = Arc::new(events);

	let fetch_state = move |ty: StateEventType, key: StateKey| {
		futures::future::ready(state.get(&(ty, key.to_string())).cloned())
	};

	let fetch_event =
		move |event_id: OwnedEventId| futures::future::ready(events.get(&event_id).cloned());

	(fetch_state, fetch_event)
}

fn rules() -> RoomVersion { RoomVersion::rules("11").expect("v11 supported") }

#[tokio::test]
async fn create_must_be_first() {
	let (fetch_state, fetch_event) = fetchers(HashMap::new(), HashMap::new());

	let first = create_event();
	check(&first, &rules(), &fetch_state, &fetch_event)
		.await
		.expect("the first event of a room authorizes itself");

	let not_first = event(
		"$latecreatelatecreatelatecreatelatecreate12",
		"m.room.create",
		"@alice:example.org",
		Some(""),
		json!({}),
		json!(["$createcreatecreatecreatecreatecreatecreate"]),
	);

	let denial = check(&not_first, &rules(), &fetch_state, &fetch_event)
		.await
		.expect_err("a second create event is rejected");
	assert_eq!(denial.rule, "create");
}

#[tokio::test]
async fn default_user_cannot_send_state() {
	let mut state = base_state();
	state.insert(
		(StateEventType::RoomMember, "@carol:example.org".to_owned()),
		event(
			"$caroljoincaroljoincaroljoincaroljoin1234567",
			"m.room.member",
			"@carol:example.org",
			Some("@carol:example.org"),
			json!({ "membership": "join" }),
			json!(["$alicejoinalicejoinalicejoinalicejoin1234567"]),
		),
	);
	let (fetch_state, fetch_event) = fetchers(state, HashMap::new());

	let topic = event(
		"$topictopictopictopictopictopictopictopic12",
		"m.room.topic",
		"@carol:example.org",
		Some(""),
		json!({ "topic": "mine now" }),
		json!(["$caroljoincaroljoincaroljoincaroljoin1234567"]),
	);

	let denial = check(&topic, &rules(), &fetch_state, &fetch_event)
		.await
		.expect_err("level 0 is below state_default 50");
	assert_eq!(denial.rule, "power");

	// The same event from the creator passes.
	let topic = event(
		"$topictopictopictopictopictopictopictopic34",
		"m.room.topic",
		"@alice:example.org",
		Some(""),
		json!({ "topic": "fine" }),
		json!(["$alicejoinalicejoinalicejoinalicejoin1234567"]),
	);

	check(&topic, &rules(), &fetch_state, &fetch_event)
		.await
		.expect("the creator holds level 100");
}

#[tokio::test]
async fn message_needs_joined_sender() {
	let (fetch_state, fetch_event) = fetchers(base_state(), HashMap::new());

	let message = event(
		"$messagemessagemessagemessagemessagemessage1",
		"m.room.message",
		"@carol:example.org",
		None,
		json!({ "body": "hello" }),
		json!(["$alicejoinalicejoinalicejoinalicejoin1234567"]),
	);

	let denial = check(&message, &rules(), &fetch_state, &fetch_event)
		.await
		.expect_err("non-members cannot send messages");
	assert_eq!(denial.rule, "membership");
}

#[tokio::test]
async fn creator_bootstrap_join() {
	let mut state = HashMap::new();
	state.insert((StateEventType::RoomCreate, String::new()), create_event());
	let (fetch_state, fetch_event) = fetchers(state, HashMap::new());

	let join = event(
		"$alicejoinalicejoinalicejoinalicejoin1234567",
		"m.room.member",
		"@alice:example.org",
		Some("@alice:example.org"),
		json!({ "membership": "join" }),
		json!(["$createcreatecreatecreatecreatecreatecreate"]),
	);

	check(&join, &rules(), &fetch_state, &fetch_event)
		.await
		.expect("the creator joins directly on the create event");
}

#[tokio::test]
async fn join_requires_invite() {
	let (fetch_state, fetch_event) = fetchers(base_state(), HashMap::new());

	let join = event(
		"$bobjoinbobjoinbobjoinbobjoinbobjoin12345678",
		"m.room.member",
		"@bob:example.com",
		Some("@bob:example.com"),
		json!({ "membership": "join" }),
		json!(["$alicejoinalicejoinalicejoinalicejoin1234567"]),
	);

	let denial = check(&join, &rules(), &fetch_state, &fetch_event)
		.await
		.expect_err("invite-only rooms reject cold joins");
	assert_eq!(denial.rule, "membership");

	// After an invite is in state the same join passes.
	let mut state = base_state();
	state.insert(
		(StateEventType::RoomMember, "@bob:example.com".to_owned()),
		event(
			"$bobinvitebobinvitebobinvitebobinvite123456",
			"m.room.member",
			"@alice:example.org",
			Some("@bob:example.com"),
			json!({ "membership": "invite" }),
			json!(["$alicejoinalicejoinalicejoinalicejoin1234567"]),
		),
	);
	let (fetch_state, fetch_event) = fetchers(state, HashMap::new());

	check(&join, &rules(), &fetch_state, &fetch_event)
		.await
		.expect("invited users may join");
}

#[tokio::test]
async fn invite_requires_joined_sender() {
	let (fetch_state, fetch_event) = fetchers(base_state(), HashMap::new());

	let invite = event(
		"$strangerinvitestrangerinvitestrangerinvite1",
		"m.room.member",
		"@mallory:example.net",
		Some("@bob:example.com"),
		json!({ "membership": "invite" }),
		json!(["$alicejoinalicejoinalicejoinalicejoin1234567"]),
	);

	let denial = check(&invite, &rules(), &fetch_state, &fetch_event)
		.await
		.expect_err("inviters must be in the room");
	assert_eq!(denial.rule, "membership");
}

#[tokio::test]
async fn ban_requires_power() {
	let mut state = base_state();
	state.insert(
		(StateEventType::RoomMember, "@carol:example.org".to_owned()),
		event(
			"$caroljoincaroljoincaroljoincaroljoin1234567",
			"m.room.member",
			"@carol:example.org",
			Some("@carol:example.org"),
			json!({ "membership": "join" }),
			json!(["$alicejoinalicejoinalicejoinalicejoin1234567"]),
		),
	);
	let (fetch_state, fetch_event) = fetchers(state, HashMap::new());

	let ban = event(
		"$banbanbanbanbanbanbanbanbanbanbanbanbanban1",
		"m.room.member",
		"@carol:example.org",
		Some("@alice:example.org"),
		json!({ "membership": "ban" }),
		json!(["$caroljoincaroljoincaroljoincaroljoin1234567"]),
	);

	let denial = check(&ban, &rules(), &fetch_state, &fetch_event)
		.await
		.expect_err("level 0 cannot ban");
	assert_eq!(denial.rule, "power");
}

#[tokio::test]
async fn redacting_own_event_is_allowed() {
	let mut state = base_state();
	state.insert(
		(StateEventType::RoomMember, "@carol:example.org".to_owned()),
		event(
			"$caroljoincaroljoincaroljoincaroljoin1234567",
			"m.room.member",
			"@carol:example.org",
			Some("@carol:example.org"),
			json!({ "membership": "join" }),
			json!(["$alicejoinalicejoinalicejoinalicejoin1234567"]),
		),
	);

	let carols_message = event(
		"$messagemessagemessagemessagemessagemessage1",
		"m.room.message",
		"@carol:example.org",
		None,
		json!({ "body": "oops" }),
		json!(["$caroljoincaroljoincaroljoincaroljoin1234567"]),
	);

	let mut events = HashMap::new();
	events.insert(carols_message.event_id.clone(), carols_message);
	let (fetch_state, fetch_event) = fetchers(state, events);

	let mut redaction = event(
		"$redactredactredactredactredactredactredact1",
		"m.room.redaction",
		"@carol:example.org",
		None,
		json!({ "redacts": "$messagemessagemessagemessagemessagemessage1" }),
		json!(["$caroljoincaroljoincaroljoincaroljoin1234567"]),
	);
	redaction.redacts = Some(owned_event_id!("$messagemessagemessagemessagemessagemessage1"));

	check(&redaction, &rules(), &fetch_state, &fetch_event)
		.await
		.expect("users may redact their own events");

	// Redacting somebody else's event still needs the redact power.
	let mut foreign = redaction.clone();
	foreign.sender = user_id!("@carol:example.org").to_owned();
	foreign.redacts = Some(owned_event_id!("$alicejoinalicejoinalicejoinalicejoin1234567"));

	let denial = check(&foreign, &rules(), &fetch_state, &fetch_event)
		.await
		.expect_err("level 0 cannot redact another user's event");
	assert_eq!(denial.rule, "redact");
}
