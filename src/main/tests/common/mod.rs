#![allow(dead_code)]

use std::sync::Arc;

use maelstrom_core::{Config, Server};
use maelstrom_database::Database;
use maelstrom_service::Services;

pub async fn harness() -> (tempfile::TempDir, Arc<Services>) {
	let dir = tempfile::tempdir().expect("tempdir created");

	let config: Config = maelstrom_core::toml::from_str(&format!(
		r#"
			server_name = "example.org"
			database_path = {:?}
		"#,
		dir.path(),
	))
	.expect("test config parses");

	let server = Arc::new(Server::new(config, None));
	let db = Database::open(&server).await.expect("database opens");
	let services = Services::build(server, db)
		.await
		.expect("services build");

	(dir, services)
}

pub fn alice() -> &'static ruma::UserId { ruma::user_id!("@alice:example.org") }

pub fn bob() -> &'static ruma::UserId { ruma::user_id!("@bob:example.com") }

pub fn carol() -> &'static ruma::UserId { ruma::user_id!("@carol:example.org") }
