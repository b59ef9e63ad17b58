use std::{
	net::{IpAddr, Ipv4Addr},
	path::{Path, PathBuf},
};

use figment::{
	Figment,
	providers::{Env, Format, Toml},
};
use ruma::OwnedServerName;
use serde::Deserialize;

use crate::{Result, err};

/// Server-wide configuration. Loaded once at startup from an optional TOML
/// file merged with `MAELSTROM_*` environment variables.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	/// The name of this homeserver; the part after the colon in user and
	/// room identifiers originated here. Required; cannot change after the
	/// database has been created.
	pub server_name: OwnedServerName,

	/// Directory for the RocksDB database.
	pub database_path: PathBuf,

	#[serde(default = "default_address")]
	pub address: IpAddr,

	#[serde(default = "default_port")]
	pub port: u16,

	/// Room version assigned to locally-created rooms when the creator does
	/// not ask for a specific one.
	#[serde(default = "default_default_room_version")]
	pub default_room_version: String,

	/// Tracing filter directives for the console log.
	#[serde(default = "default_log")]
	pub log: String,

	/// Whether this server participates in federation at all.
	#[serde(default = "true_fn")]
	pub federation_enable: bool,

	/// Number of recent message events returned by the room initialSync
	/// endpoint.
	#[serde(default = "default_initialsync_backfill")]
	pub initialsync_backfill: usize,

	/// Seconds allowed for acquiring a missing event and its dependencies
	/// from remote servers.
	#[serde(default = "default_fetch_timeout")]
	pub fetch_timeout: u64,

	/// Upper bound on the number of unknown referenced events acquired while
	/// ingesting one event.
	#[serde(default = "default_fetch_limit")]
	pub fetch_limit: usize,

	/// Seconds allowed for any single remote request.
	#[serde(default = "default_request_timeout")]
	pub request_timeout: u64,

	/// Allow state queries anchored at historical events. When disabled,
	/// anchored queries answer NotFound and only present state is served.
	#[serde(default = "true_fn")]
	pub state_enable_history: bool,

	/// Bytes of storage read-ahead hinted when iterating room state.
	#[serde(default)]
	pub state_readahead_size: usize,

	/// `limit` applied to federation backfill_ids requests which do not
	/// specify one.
	#[serde(default = "default_backfill_ids_limit_default")]
	pub backfill_ids_limit_default: usize,

	/// Hard cap on the `limit` of federation backfill_ids requests.
	#[serde(default = "default_backfill_ids_limit_max")]
	pub backfill_ids_limit_max: usize,
}

impl Config {
	/// Read the configuration, merging the TOML file at `path` (when given)
	/// with prefixed environment variables.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let mut figment = Figment::new();

		if let Some(path) = path {
			figment = figment.merge(Toml::file(path));
		}

		let config: Self = figment
			.merge(Env::prefixed("MAELSTROM_").split("__"))
			.extract()?;

		config.check()?;
		Ok(config)
	}

	fn check(&self) -> Result {
		if self.backfill_ids_limit_default > self.backfill_ids_limit_max {
			return Err(err!(Config(
				"backfill_ids_limit_default",
				"must not exceed backfill_ids_limit_max ({})",
				self.backfill_ids_limit_max
			)));
		}

		if self.fetch_limit == 0 {
			return Err(err!(Config("fetch_limit", "must be nonzero")));
		}

		Ok(())
	}
}

fn true_fn() -> bool { true }

fn default_address() -> IpAddr { IpAddr::V4(Ipv4Addr::LOCALHOST) }

fn default_port() -> u16 { 8008 }

fn default_default_room_version() -> String { "11".to_owned() }

fn default_log() -> String { "info".to_owned() }

fn default_initialsync_backfill() -> usize { 20 }

fn default_fetch_timeout() -> u64 { 45 }

fn default_fetch_limit() -> usize { 64 }

fn default_request_timeout() -> u64 { 10 }

fn default_backfill_ids_limit_default() -> usize { 64 }

fn default_backfill_ids_limit_max() -> usize { 131_072 }
