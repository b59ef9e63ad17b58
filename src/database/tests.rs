use std::sync::Arc;

use maelstrom_core::{Config, Server, utils};

use crate::{Database, keyval};

fn test_server(path: &std::path::Path) -> Arc<Server> {
	let config: Config = maelstrom_core::toml::from_str(&format!(
		r#"
			server_name = "example.org"
			database_path = {path:?}
		"#,
	))
	.expect("test config parses");

	Arc::new(Server::new(config, None))
}

async fn open() -> (tempfile::TempDir, Arc<Database>) {
	let dir = tempfile::tempdir().expect("tempdir created");
	let server = test_server(dir.path());
	let db = Database::open(&server).await.expect("database opens");
	(dir, db)
}

#[tokio::test]
async fn get_of_missing_key_is_not_found() {
	let (_dir, db) = open().await;
	let map = &db["global"];

	let err = map.get(b"nonexistent").await.expect_err("missing key");
	assert!(err.is_not_found());
}

#[tokio::test]
async fn put_then_get() {
	let (_dir, db) = open().await;
	let map = &db["global"];

	map.put(b"counter", utils::u64_to_u8(7)).expect("write succeeds");
	let val = map.get(b"counter").await.expect("key exists");
	assert_eq!(utils::u64_from_u8(&val), 7);
}

#[tokio::test]
async fn batch_commits_atomically_across_maps() {
	let (_dir, db) = open().await;

	let mut batch = db.batch();
	batch.set(&db["eventid_idx"], b"$event", utils::u64_to_u8(1));
	batch.set(&db["idx_eventid"], utils::u64_to_u8(1), b"$event");
	batch.set(&db["global"], b"counter", utils::u64_to_u8(1));
	assert_eq!(batch.len(), 3);

	// Nothing is visible before commit.
	assert!(db["eventid_idx"].get(b"$event").await.is_err());

	db.commit(batch).await.expect("commit succeeds");

	assert!(db["eventid_idx"].get(b"$event").await.is_ok());
	assert!(db["idx_eventid"].get(utils::u64_to_u8(1)).await.is_ok());
}

#[tokio::test]
async fn prefix_scan_is_ordered_and_bounded() {
	let (_dir, db) = open().await;
	let map = &db["room_events"];

	let room = "!r:example.org";
	let other = "!z:example.org";
	for depth in [3_u64, 1, 2] {
		let mut key = keyval::prefix(&[room]);
		keyval::push_u64(&mut key, depth);
		keyval::push_u64(&mut key, depth);
		map.put(&key, b"").expect("write succeeds");
	}

	let mut stray = keyval::prefix(&[other]);
	keyval::push_u64(&mut stray, 1);
	keyval::push_u64(&mut stray, 9);
	map.put(&stray, b"").expect("write succeeds");

	let prefix = keyval::prefix(&[room]);
	let depths: Vec<u64> = map
		.iter_prefix(&prefix)
		.map(|item| {
			let (key, _) = item.expect("scan succeeds");
			let (head, _idx) = keyval::split_u64_tail(&key).expect("idx tail");
			let (_room, depth) = keyval::split_u64_tail(head).expect("depth tail");
			depth
		})
		.collect();

	assert_eq!(depths, vec![1, 2, 3], "forward scan yields ascending depth");

	let depths: Vec<u64> = map
		.rev_iter_prefix(&prefix)
		.map(|item| {
			let (key, _) = item.expect("scan succeeds");
			let (head, _idx) = keyval::split_u64_tail(&key).expect("idx tail");
			let (_room, depth) = keyval::split_u64_tail(head).expect("depth tail");
			depth
		})
		.collect();

	assert_eq!(depths, vec![3, 2, 1], "reverse scan yields descending depth");
}

#[test]
fn composite_keys_split() {
	let key = keyval::key3("!r:example.org", "m.room.member", "@alice:example.org");
	let (room, kind, state_key) = keyval::split3(&key).expect("three segments");

	assert_eq!(room, "!r:example.org");
	assert_eq!(kind, "m.room.member");
	assert_eq!(state_key, "@alice:example.org");

	let key = keyval::key2("!r:example.org", "$event");
	let (room, event_id) = keyval::split2(&key).expect("two segments");
	assert_eq!(room, "!r:example.org");
	assert_eq!(event_id, "$event");
}
