use std::{collections::BTreeMap, sync::Arc};

use maelstrom_core::Result;

use crate::{Engine, Map};

#[derive(Clone, Copy, Debug)]
pub struct Descriptor {
	pub name: &'static str,
}

pub(crate) type Maps = BTreeMap<&'static str, Arc<Map>>;

/// All columns of the event store.
///
/// Event attributes are sharded one column per field, keyed by the dense
/// 8-byte event index, so readers fetch exactly the fields they need.
/// Composite keys are documented in `keyval`.
pub const MAPS: &[Descriptor] = &[
	// event_id <-> index
	Descriptor { name: "eventid_idx" },
	Descriptor { name: "idx_eventid" },
	// event field shards; key = idx
	Descriptor { name: "event_auth_events" },
	Descriptor { name: "event_content" },
	Descriptor { name: "event_depth" },
	Descriptor { name: "event_hashes" },
	Descriptor { name: "event_membership" },
	Descriptor { name: "event_origin" },
	Descriptor { name: "event_origin_server_ts" },
	Descriptor { name: "event_prev_events" },
	Descriptor { name: "event_redacts" },
	Descriptor { name: "event_room_id" },
	Descriptor { name: "event_sender" },
	Descriptor { name: "event_signatures" },
	Descriptor { name: "event_state_key" },
	Descriptor { name: "event_type" },
	Descriptor { name: "event_unsigned" },
	// room orderings and state
	// (room_id, depth, idx) -> ()
	Descriptor { name: "room_events" },
	// (room_id, type, state_key) -> idx
	Descriptor { name: "room_state" },
	// (room_id, type, state_key, depth, idx) -> ()
	Descriptor { name: "room_state_space" },
	// (room_id, origin, user_id) -> idx
	Descriptor { name: "room_joined" },
	// (room_id, event_id) -> idx
	Descriptor { name: "room_head" },
	// (target_idx, ref_kind, referrer_idx) -> ()
	Descriptor { name: "event_refs" },
	// singleton cells: counter, keypair
	Descriptor { name: "global" },
];

pub(crate) fn open(engine: &Arc<Engine>) -> Result<Maps> {
	MAPS.iter()
		.map(|desc| Map::open(engine, desc.name).map(|map| (desc.name, map)))
		.collect()
}
