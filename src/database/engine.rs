use std::{
	collections::BTreeSet,
	path::Path,
	sync::Arc,
};

use maelstrom_core::{Result, Server, err, implement};
use rocksdb::{
	ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options, ReadOptions, WriteBatch,
	WriteOptions,
};
use tracing::{debug, info, warn};

use crate::maps::Descriptor;

pub(crate) type Db = DBWithThreadMode<MultiThreaded>;

pub struct Engine {
	pub(crate) db: Db,
	read_only: bool,
}

#[implement(Engine)]
#[tracing::instrument(skip_all)]
pub(crate) fn open(server: &Arc<Server>, desc: &[Descriptor]) -> Result<Arc<Self>> {
	let config = &server.config;
	let path = &config.database_path;

	let mut db_opts = Options::default();
	db_opts.create_if_missing(true);
	db_opts.create_missing_column_families(true);

	let cfds = Self::configure_cfds(path, &db_opts, desc)?;
	let num_cfds = cfds.len();
	debug!("Configured {num_cfds} column descriptors...");

	let load_time = std::time::Instant::now();
	let db = Db::open_cf_descriptors(&db_opts, path, cfds)
		.map_err(|e| err!(Database("failed to open database at {path:?}: {e}")))?;

	info!(
		columns = num_cfds,
		sequence = %db.latest_sequence_number(),
		time = ?load_time.elapsed(),
		"Opened database."
	);

	Ok(Arc::new(Self { db, read_only: false }))
}

/// Union of the described columns and whatever an existing database
/// already contains, so stale columns never fail the open.
#[implement(Engine)]
fn configure_cfds(
	path: &Path,
	db_opts: &Options,
	desc: &[Descriptor],
) -> Result<Vec<ColumnFamilyDescriptor>> {
	let existing = Self::discover_cfs(path, db_opts);

	for name in &existing {
		if name != "default" && !desc.iter().any(|desc| desc.name == name) {
			warn!("Found undescribed column {name:?} in existing database.");
		}
	}

	let cfds = desc
		.iter()
		.map(|desc| desc.name.to_owned())
		.chain(
			existing
				.into_iter()
				.filter(|name| !desc.iter().any(|desc| desc.name == name)),
		)
		.map(|name| ColumnFamilyDescriptor::new(name, db_opts.clone()))
		.collect();

	Ok(cfds)
}

#[implement(Engine)]
fn discover_cfs(path: &Path, opts: &Options) -> BTreeSet<String> {
	Db::list_cf(opts, path)
		.unwrap_or_default()
		.into_iter()
		.collect::<BTreeSet<_>>()
}

#[implement(Engine)]
pub(crate) fn write(&self, batch: WriteBatch) -> Result {
	let mut opts = WriteOptions::default();
	opts.set_sync(false);

	self.db
		.write_opt(batch, &opts)
		.map_err(|e| err!(Database("write batch failed: {e}")))
}

#[implement(Engine)]
pub(crate) fn read_options(&self) -> ReadOptions {
	let mut opts = ReadOptions::default();
	opts.set_total_order_seek(true);
	opts
}

#[implement(Engine)]
pub(crate) fn write_options(&self) -> WriteOptions { WriteOptions::default() }

#[implement(Engine)]
#[inline]
pub fn is_read_only(&self) -> bool { self.read_only }

#[implement(Engine)]
pub fn flush(&self) -> Result {
	self.db
		.flush_wal(true)
		.map_err(|e| err!(Database("wal flush failed: {e}")))
}
