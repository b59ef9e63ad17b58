mod common;

use maelstrom_core::{PduBuilder, Result};
use maelstrom_service::rooms::event_handler::{CreateOpts, Opts};
use ruma::{
	CanonicalJsonObject, OwnedEventId, OwnedRoomId, RoomId, RoomVersionId, UserId,
	events::{StateEventType, TimelineEventType, room::member::MembershipState},
	serde::Base64,
	server_name,
	signatures::Ed25519KeyPair,
};
use serde_json::{json, value::to_raw_value};

use self::common::{alice, bob, carol, harness};

fn state_builder(event_type: &str, state_key: &str, content: serde_json::Value) -> PduBuilder {
	PduBuilder {
		event_type: event_type.into(),
		content: to_raw_value(&content).expect("literal content serializes"),
		unsigned: None,
		state_key: Some(state_key.to_owned()),
		redacts: None,
		timestamp: None,
	}
}

fn message_builder(body: &str) -> PduBuilder {
	PduBuilder {
		event_type: TimelineEventType::RoomMessage,
		content: to_raw_value(&json!({ "msgtype": "m.text", "body": body }))
			.expect("literal content serializes"),
		unsigned: None,
		state_key: None,
		redacts: None,
		timestamp: None,
	}
}

async fn create_room(services: &maelstrom_service::Services) -> OwnedRoomId {
	services
		.create
		.create_room(alice(), CreateOpts::default())
		.await
		.expect("room creation succeeds")
}

/// Sign and ingest an event as if example.com had sent it to us.
async fn ingest_remote(
	services: &maelstrom_service::Services,
	remote_key: &Ed25519KeyPair,
	room_id: &RoomId,
	mut object: CanonicalJsonObject,
) -> Result<u64> {
	ruma::signatures::hash_and_sign_event(
		"example.com",
		remote_key,
		&mut object,
		&RoomVersionId::V11,
	)
	.expect("remote signing succeeds");

	services
		.event_handler
		.handle_incoming(
			server_name!("example.com"),
			room_id,
			object,
			Opts::federation(server_name!("example.com").to_owned()),
		)
		.await
}

fn remote_keypair(services: &maelstrom_service::Services) -> Ed25519KeyPair {
	let der = Ed25519KeyPair::generate().expect("keypair generates");
	let key = Ed25519KeyPair::from_der(&der, "1".to_owned()).expect("keypair loads");

	services.globals.add_verify_key(
		"example.com",
		"ed25519:1",
		Base64::new(key.public_key().to_vec()),
	);

	key
}

/// A membership event as example.com would author it.
async fn remote_member_json(
	services: &maelstrom_service::Services,
	room_id: &RoomId,
	sender: &UserId,
	target: &UserId,
	membership: &str,
) -> CanonicalJsonObject {
	let (head, _) = services
		.state
		.head(room_id)
		.await
		.expect("room has a head");

	let mut auth_events: Vec<OwnedEventId> = Vec::new();
	for (kind, state_key) in [
		(StateEventType::RoomCreate, String::new()),
		(StateEventType::RoomPowerLevels, String::new()),
		(StateEventType::RoomMember, target.to_string()),
	] {
		if let Ok(idx) = services
			.state_accessor
			.state_get_idx(room_id, &kind, &state_key)
			.await
		{
			auth_events.push(services.short.get_eventid(idx).await.expect("id known"));
		}
	}

	let head_idx = services
		.short
		.get_idx(&head)
		.await
		.expect("head indexed");
	let depth = services
		.timeline
		.get_depth(head_idx)
		.await
		.expect("head depth known")
		+ 1;

	let value = json!({
		"type": "m.room.member",
		"content": { "membership": membership },
		"room_id": room_id,
		"sender": sender,
		"state_key": target,
		"origin": "example.com",
		"origin_server_ts": 1_700_000_000_000_u64,
		"depth": depth,
		"prev_events": [head],
		"auth_events": auth_events,
	});

	let serde_json::Value::Object(map) = value else {
		unreachable!("literal is an object");
	};

	ruma::canonical_json::try_from_json_map(map).expect("literal is canonical")
}

#[tokio::test]
async fn create_and_self_join() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;

	// The creation flow leaves m.room.create as present state and the
	// creator joined.
	let create = services
		.state_accessor
		.state_get(&room_id, &StateEventType::RoomCreate, "")
		.await
		.expect("create event is present state");
	assert_eq!(create.sender, alice());

	assert!(services.state_accessor.exists(&room_id).await);
	assert!(services.state_cache.is_joined(alice(), &room_id).await);

	let local_members: Vec<_> = services
		.state_cache
		.room_members_of(&room_id, server_name!("example.org"))
		.collect::<Result<_>>()
		.expect("members listing succeeds");
	assert_eq!(local_members, vec![alice().to_owned()]);

	assert!(services.state_cache.local_joined(&room_id).await);
	assert!(!services.state_cache.remote_joined(&room_id).await);

	let (head, head_idx) = services
		.state
		.head(&room_id)
		.await
		.expect("room has a head");
	let depth = services
		.timeline
		.get_depth(head_idx)
		.await
		.expect("head depth known");
	assert!(depth >= 1, "created room has nonzero depth");
	assert!(head.as_str().starts_with('$'));
}

#[tokio::test]
async fn invite_and_accept() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;
	let remote_key = remote_keypair(&services);

	services
		.timeline
		.invite(&room_id, alice(), bob())
		.await
		.expect("invite succeeds");

	let invite = services
		.state_accessor
		.get_member(&room_id, bob())
		.await
		.expect("invite is present state");
	assert_eq!(invite.sender, alice());
	assert_eq!(invite.membership().expect("has membership"), MembershipState::Invite);

	// Bob's server posts back a signed join.
	let join = remote_member_json(&services, &room_id, bob(), bob(), "join").await;
	ingest_remote(&services, &remote_key, &room_id, join)
		.await
		.expect("remote join is accepted");

	let member = services
		.state_accessor
		.get_member(&room_id, bob())
		.await
		.expect("join is present state");
	assert_eq!(member.membership().expect("has membership"), MembershipState::Join);
	assert!(services.state_cache.remote_joined(&room_id).await);
}

#[tokio::test]
async fn unsigned_remote_event_is_rejected() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;
	let _trusted = remote_keypair(&services);

	services
		.timeline
		.invite(&room_id, alice(), bob())
		.await
		.expect("invite succeeds");

	// Same join but never signed.
	let join = remote_member_json(&services, &room_id, bob(), bob(), "join").await;
	let rejected = services
		.event_handler
		.handle_incoming(
			server_name!("example.com"),
			&room_id,
			join,
			Opts::federation(server_name!("example.com").to_owned()),
		)
		.await;

	assert!(rejected.is_err(), "unsigned events do not commit");
	assert_eq!(
		services
			.state_accessor
			.user_membership(&room_id, bob())
			.await,
		MembershipState::Invite,
		"membership unchanged"
	);
}

#[tokio::test]
async fn redaction_strips_target() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;
	let remote_key = remote_keypair(&services);

	services
		.timeline
		.invite(&room_id, alice(), bob())
		.await
		.expect("invite succeeds");

	let join = remote_member_json(&services, &room_id, bob(), bob(), "join").await;
	ingest_remote(&services, &remote_key, &room_id, join)
		.await
		.expect("remote join is accepted");

	let join_id = services
		.state_accessor
		.get_member(&room_id, bob())
		.await
		.expect("join present")
		.event_id;

	// Alice holds the redact power by default.
	let redaction = PduBuilder {
		event_type: TimelineEventType::RoomRedaction,
		content: to_raw_value(&json!({ "redacts": join_id, "reason": "spam" }))
			.expect("literal content serializes"),
		unsigned: None,
		state_key: None,
		redacts: Some(join_id.clone()),
		timestamp: None,
	};

	services
		.timeline
		.build_and_append(&room_id, alice(), redaction, &Opts::local())
		.await
		.expect("redaction is accepted");

	let target = services
		.timeline
		.get_pdu(&join_id)
		.await
		.expect("target still stored");

	assert!(target.is_redacted(), "redaction effect applied");
	assert_eq!(
		target.membership().expect("membership is protected"),
		MembershipState::Join,
		"protected keys survive"
	);

	let content: serde_json::Value =
		serde_json::from_str(target.content.get()).expect("content parses");
	assert!(content.get("displayname").is_none());
}

#[tokio::test]
async fn backfill_walks_backwards() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;

	for n in 0..100 {
		services
			.timeline
			.build_and_append(&room_id, alice(), message_builder(&format!("{n}")), &Opts::local())
			.await
			.expect("message is accepted");
	}

	let walk: Vec<(u64, u64)> = services
		.timeline
		.pdus_rev(&room_id, None)
		.take(20)
		.collect::<Result<_>>()
		.expect("walk succeeds");

	assert_eq!(walk.len(), 20, "exactly the requested page");

	let depths: Vec<u64> = walk.iter().map(|(depth, _)| *depth).collect();
	let mut sorted = depths.clone();
	sorted.sort_unstable_by(|a, b| b.cmp(a));
	assert_eq!(depths, sorted, "strictly newest first");

	let (_, head_idx) = services.state.head(&room_id).await.expect("head");
	let head_depth = services
		.timeline
		.get_depth(head_idx)
		.await
		.expect("depth");
	assert_eq!(depths[0], head_depth, "page starts at the head");
}

#[tokio::test]
async fn state_at_historical_point() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;

	services
		.timeline
		.build_and_append(
			&room_id,
			alice(),
			state_builder("m.room.name", "", json!({ "name": "A" })),
			&Opts::local(),
		)
		.await
		.expect("first name is accepted");

	let (mid_id, _) = services
		.timeline
		.build_and_append(&room_id, alice(), message_builder("between"), &Opts::local())
		.await
		.expect("message is accepted");

	services
		.timeline
		.build_and_append(
			&room_id,
			alice(),
			state_builder("m.room.name", "", json!({ "name": "B" })),
			&Opts::local(),
		)
		.await
		.expect("second name is accepted");

	#[derive(serde::Deserialize)]
	struct Name {
		name: String,
	}

	// Anchored between the two name events: the older name.
	let view = services
		.state_accessor
		.view(&room_id, Some(&mid_id))
		.await
		.expect("view opens");
	assert!(!view.present(), "anchor below the head is historical");

	let idx = view
		.get(&StateEventType::RoomName, "")
		.await
		.expect("name at anchor");
	let name: Name = services
		.timeline
		.get_pdu_from_idx(idx)
		.await
		.expect("event loads")
		.get_content()
		.expect("name content");
	assert_eq!(name.name, "A");

	// At the head and at present: the newer name.
	let (head, _) = services.state.head(&room_id).await.expect("head");
	let view = services
		.state_accessor
		.view(&room_id, Some(&head))
		.await
		.expect("view opens");
	assert!(view.present(), "the head anchor is the present");

	let idx = view
		.get(&StateEventType::RoomName, "")
		.await
		.expect("name at head");
	let name: Name = services
		.timeline
		.get_pdu_from_idx(idx)
		.await
		.expect("event loads")
		.get_content()
		.expect("name content");
	assert_eq!(name.name, "B");
}

#[tokio::test]
async fn power_level_denial_commits_nothing() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;

	// Carol joins with default power 0.
	services
		.timeline
		.invite(&room_id, alice(), carol())
		.await
		.expect("invite succeeds");
	services
		.timeline
		.build_and_append(
			&room_id,
			carol(),
			state_builder("m.room.member", carol().as_str(), json!({ "membership": "join" })),
			&Opts::local(),
		)
		.await
		.expect("carol joins");

	let heads_before: Vec<_> = services
		.state
		.heads(&room_id)
		.collect::<Result<_>>()
		.expect("heads listing");
	let count_before = services.globals.current_count();

	let denied = services
		.timeline
		.build_and_append(
			&room_id,
			carol(),
			state_builder("m.room.topic", "", json!({ "topic": "mine now" })),
			&Opts::local(),
		)
		.await
		.expect_err("level 0 is below state_default 50");

	assert_eq!(denied.status_code(), maelstrom_core::http::StatusCode::FORBIDDEN);

	let heads_after: Vec<_> = services
		.state
		.heads(&room_id)
		.collect::<Result<_>>()
		.expect("heads listing");
	assert_eq!(heads_before, heads_after, "no change to the head set");
	assert_eq!(services.globals.current_count(), count_before, "no index minted");

	assert!(
		services
			.state_accessor
			.state_get(&room_id, &StateEventType::RoomTopic, "")
			.await
			.is_err(),
		"no topic committed"
	);
}

#[tokio::test]
async fn reingest_is_idempotent() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;
	let remote_key = remote_keypair(&services);

	services
		.timeline
		.invite(&room_id, alice(), bob())
		.await
		.expect("invite succeeds");

	let join = remote_member_json(&services, &room_id, bob(), bob(), "join").await;
	let first = ingest_remote(&services, &remote_key, &room_id, join.clone())
		.await
		.expect("first ingest commits");

	let count = services.globals.current_count();

	let second = ingest_remote(&services, &remote_key, &room_id, join)
		.await
		.expect("re-ingest is a no-op");

	assert_eq!(first, second, "same index returned");
	assert_eq!(services.globals.current_count(), count, "no further mint");
}

#[tokio::test]
async fn heads_are_exactly_the_childless_events() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;

	for n in 0..5 {
		services
			.timeline
			.build_and_append(&room_id, alice(), message_builder(&format!("{n}")), &Opts::local())
			.await
			.expect("message is accepted");
	}

	let heads: Vec<u64> = services
		.state
		.heads(&room_id)
		.map(|item| item.map(|(_, idx)| idx))
		.collect::<Result<_>>()
		.expect("heads listing");

	let all: Vec<(u64, u64)> = services
		.timeline
		.pdus(&room_id, None)
		.collect::<Result<_>>()
		.expect("room walk");

	let mut childless = Vec::new();
	for (_, idx) in all {
		if !services.metadata.has_children(idx).await {
			childless.push(idx);
		}
	}

	let mut heads = heads;
	heads.sort_unstable();
	childless.sort_unstable();
	assert_eq!(heads, childless, "head set equals the childless set");
}

#[tokio::test]
async fn present_state_matches_forward_replay() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;

	services
		.timeline
		.build_and_append(
			&room_id,
			alice(),
			state_builder("m.room.name", "", json!({ "name": "A" })),
			&Opts::local(),
		)
		.await
		.expect("name is accepted");
	services
		.timeline
		.build_and_append(
			&room_id,
			alice(),
			state_builder("m.room.name", "", json!({ "name": "B" })),
			&Opts::local(),
		)
		.await
		.expect("rename is accepted");

	// Replay the room forward; the last state event per (type, state_key)
	// must equal the present-state column.
	let mut replayed: std::collections::BTreeMap<(String, String), u64> = Default::default();
	let walk: Vec<(u64, u64)> = services
		.timeline
		.pdus(&room_id, None)
		.collect::<Result<_>>()
		.expect("room walk");

	for (_, idx) in walk {
		let pdu = services
			.timeline
			.get_pdu_from_idx(idx)
			.await
			.expect("event loads");
		if let Some(state_key) = pdu.state_key.as_deref() {
			replayed.insert((pdu.kind.to_string(), state_key.to_owned()), idx);
		}
	}

	let present: std::collections::BTreeMap<(String, String), u64> = services
		.state_accessor
		.state_full(&room_id)
		.map(|item| item.map(|(kind, state_key, idx)| ((kind, state_key), idx)))
		.collect::<Result<_>>()
		.expect("state listing");

	assert_eq!(present, replayed, "present state derives from the event log");
}

#[tokio::test]
async fn superseded_state_gains_next_state_edge() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;

	let (first_id, first_idx) = services
		.timeline
		.build_and_append(
			&room_id,
			alice(),
			state_builder("m.room.name", "", json!({ "name": "A" })),
			&Opts::local(),
		)
		.await
		.expect("first name is accepted");

	let (_, second_idx) = services
		.timeline
		.build_and_append(
			&room_id,
			alice(),
			state_builder("m.room.name", "", json!({ "name": "B" })),
			&Opts::local(),
		)
		.await
		.expect("second name is accepted");

	assert_eq!(
		services
			.metadata
			.next_state(first_idx)
			.await
			.expect("superseded event has a successor"),
		second_idx,
	);
	assert_eq!(
		services
			.metadata
			.prev_state(second_idx)
			.await
			.expect("successor points back"),
		first_idx,
	);
	assert!(
		services.metadata.next_state(second_idx).await.is_err(),
		"present state has no successor"
	);

	// The superseded event is retained; only the edge marks it replaced.
	assert!(services.timeline.get_pdu(&first_id).await.is_ok());
}

#[tokio::test]
async fn head_reset_and_rebuild() {
	let (_dir, services) = harness().await;
	let room_id = create_room(&services).await;

	for n in 0..3 {
		services
			.timeline
			.build_and_append(&room_id, alice(), message_builder(&format!("{n}")), &Opts::local())
			.await
			.expect("message is accepted");
	}

	let heads: Vec<_> = services
		.state
		.heads(&room_id)
		.collect::<Result<_>>()
		.expect("heads listing");

	services
		.state
		.reset(&room_id)
		.await
		.expect("reset succeeds");

	let after_reset: Vec<_> = services
		.state
		.heads(&room_id)
		.collect::<Result<_>>()
		.expect("heads listing");
	assert_eq!(after_reset.len(), 1, "reset collapses to the deepest event");
	assert_eq!(after_reset, heads, "a linear room already had one head");

	// Wreck the column, then reconstruct it from the graph.
	services
		.state
		.rebuild(&room_id)
		.await
		.expect("rebuild succeeds");

	let after_rebuild: Vec<_> = services
		.state
		.heads(&room_id)
		.collect::<Result<_>>()
		.expect("heads listing");
	assert_eq!(after_rebuild, heads, "rebuild recovers the childless set");
}
