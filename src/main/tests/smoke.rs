mod common;

use self::common::harness;

#[tokio::test]
async fn services_boot_on_fresh_database() {
	let (_dir, services) = harness().await;

	assert_eq!(services.globals.server_name(), "example.org");
	assert_eq!(services.globals.current_count(), 0, "fresh database mints from zero");
	assert!(services.db.get("room_state").is_ok());
	assert!(services.db.get("no_such_column").is_err());
}

#[tokio::test]
async fn config_defaults() {
	let (_dir, services) = harness().await;
	let config = &services.server.config;

	assert_eq!(config.initialsync_backfill, 20);
	assert_eq!(config.fetch_timeout, 45);
	assert_eq!(config.fetch_limit, 64);
	assert!(config.state_enable_history);
	assert_eq!(config.state_readahead_size, 0);
	assert_eq!(config.backfill_ids_limit_default, 64);
	assert_eq!(config.backfill_ids_limit_max, 131_072);
	assert_eq!(config.default_room_version, "11");
}

#[tokio::test]
async fn counter_survives_reopen() {
	let dir = tempfile::tempdir().expect("tempdir created");

	let config = || -> maelstrom_core::Config {
		maelstrom_core::toml::from_str(&format!(
			r#"
				server_name = "example.org"
				database_path = {:?}
			"#,
			dir.path(),
		))
		.expect("test config parses")
	};

	let minted = {
		let server = std::sync::Arc::new(maelstrom_core::Server::new(config(), None));
		let db = maelstrom_database::Database::open(&server)
			.await
			.expect("database opens");
		let services = maelstrom_service::Services::build(server, db)
			.await
			.expect("services build");

		services
			.create
			.create_room(
				ruma::user_id!("@alice:example.org"),
				maelstrom_service::rooms::event_handler::CreateOpts::default(),
			)
			.await
			.expect("room creation succeeds");

		services.globals.current_count()
	};

	assert!(minted >= 3, "creation mints the create, join and power events");

	let server = std::sync::Arc::new(maelstrom_core::Server::new(config(), None));
	let db = maelstrom_database::Database::open(&server)
		.await
		.expect("database reopens");
	let services = maelstrom_service::Services::build(server, db)
		.await
		.expect("services rebuild");

	assert_eq!(
		services.globals.current_count(),
		minted,
		"the dense counter is durable"
	);
}

#[tokio::test]
async fn shutdown_signal_latches() {
	let (_dir, services) = harness().await;
	let server = &services.server;

	assert!(server.running());
	server.shutdown().expect("first shutdown succeeds");
	assert!(!server.running());
	assert!(server.shutdown().is_err(), "second shutdown reports in-progress");
	assert!(server.check_running().is_err());
}
