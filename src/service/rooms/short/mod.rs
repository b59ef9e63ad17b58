use std::sync::Arc;

use maelstrom_core::{Result, err, implement, utils};
use maelstrom_database::{Batch, Map};
use ruma::{EventId, OwnedEventId};

use crate::service;

/// Dense index assigned to each event id on first ingest. All secondary
/// columns reference events by index, never by id.
pub type EventIdx = u64;

pub struct Service {
	db: Data,
	services: Arc<crate::OnceServices>,
}

struct Data {
	eventid_idx: Arc<Map>,
	idx_eventid: Arc<Map>,
}

impl crate::Service for Service {
	fn build(args: &crate::Args<'_>) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			db: Data {
				eventid_idx: args.db["eventid_idx"].clone(),
				idx_eventid: args.db["idx_eventid"].clone(),
			},
			services: args.services.clone(),
		}))
	}

	fn name(&self) -> &str { service::make_name(std::module_path!()) }
}

#[implement(Service)]
pub async fn get_idx(&self, event_id: &EventId) -> Result<EventIdx> {
	let val = self.db.eventid_idx.get(event_id.as_bytes()).await?;

	utils::checked_u64_from_u8(&val)
}

#[implement(Service)]
pub fn get_idx_blocking(&self, event_id: &EventId) -> Result<EventIdx> {
	let val = self.db.eventid_idx.get_blocking(event_id.as_bytes())?;

	utils::checked_u64_from_u8(&val)
}

#[implement(Service)]
pub async fn get_eventid(&self, idx: EventIdx) -> Result<OwnedEventId> {
	let val = self.db.idx_eventid.get(utils::u64_to_u8(idx)).await?;

	utils::str_from_u8(&val)?
		.try_into()
		.map_err(|e| err!(Database("event id for index {idx} is corrupt: {e}")))
}

/// Mint an index for a new event id, staging the bijective mapping and the
/// advanced counter into the caller's batch. Returns the existing index
/// unchanged when the id was already ingested.
#[implement(Service)]
pub fn get_or_create_idx(&self, event_id: &EventId, batch: &mut Batch) -> EventIdx {
	if let Ok(idx) = self.get_idx_blocking(event_id) {
		return idx;
	}

	let idx = self.services.globals.next_count();

	batch.set(&self.db.eventid_idx, event_id.as_bytes(), utils::u64_to_u8(idx));
	batch.set(&self.db.idx_eventid, utils::u64_to_u8(idx), event_id.as_bytes());
	self.services.globals.persist_count(batch);

	idx
}
