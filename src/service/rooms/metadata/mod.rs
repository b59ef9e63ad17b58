use std::sync::Arc;

use maelstrom_core::{Result, err, implement, utils};
use maelstrom_database::{Batch, Map};

use super::EventIdx;
use crate::service;

/// Kinds of edges recorded in the reference column. Entries are keyed by
/// the referenced event so backward traversal is one prefix scan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum RefKind {
	PrevEvent = 0,
	AuthEvent = 1,
	PrevState = 2,
	NextState = 3,
}

pub struct Service {
	db: Data,
}

struct Data {
	event_refs: Arc<Map>,
}

impl crate::Service for Service {
	fn build(args: &crate::Args<'_>) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			db: Data { event_refs: args.db["event_refs"].clone() },
		}))
	}

	fn name(&self) -> &str { service::make_name(std::module_path!()) }
}

fn refs_key(target: EventIdx, kind: RefKind, referrer: EventIdx) -> Vec<u8> {
	let mut key = Vec::with_capacity(17);
	key.extend_from_slice(&utils::u64_to_u8(target));
	key.push(kind as u8);
	key.extend_from_slice(&utils::u64_to_u8(referrer));
	key
}

fn refs_prefix(target: EventIdx, kind: RefKind) -> Vec<u8> {
	let mut key = Vec::with_capacity(9);
	key.extend_from_slice(&utils::u64_to_u8(target));
	key.push(kind as u8);
	key
}

#[implement(Service)]
pub fn add_ref(&self, batch: &mut Batch, target: EventIdx, kind: RefKind, referrer: EventIdx) {
	batch.set(&self.db.event_refs, refs_key(target, kind, referrer), b"");
}

/// Indices of the events referencing `target` through an edge of `kind`.
#[implement(Service)]
pub fn referrers(
	&self,
	target: EventIdx,
	kind: RefKind,
) -> impl Iterator<Item = Result<EventIdx>> + '_ {
	self.db
		.event_refs
		.iter_prefix(&refs_prefix(target, kind))
		.map(|item| {
			let (key, _) = item?;
			let (_, referrer) = maelstrom_database::split_u64_tail(&key)?;
			Ok(referrer)
		})
}

/// Events whose prev_events point at this one; the local children in the
/// room DAG.
#[implement(Service)]
pub fn children(&self, idx: EventIdx) -> impl Iterator<Item = Result<EventIdx>> + '_ {
	self.referrers(idx, RefKind::PrevEvent)
}

#[implement(Service)]
pub async fn has_children(&self, idx: EventIdx) -> bool {
	self.children(idx).next().is_some()
}

/// The state event which superseded this one for its (type, state_key),
/// if any. A state event without one is present state.
#[implement(Service)]
pub async fn next_state(&self, idx: EventIdx) -> Result<EventIdx> {
	self.referrers(idx, RefKind::NextState)
		.next()
		.transpose()?
		.ok_or_else(|| err!(NotFound("event {idx} has not been superseded")))
}

#[implement(Service)]
pub async fn prev_state(&self, idx: EventIdx) -> Result<EventIdx> {
	self.referrers(idx, RefKind::PrevState)
		.next()
		.transpose()?
		.ok_or_else(|| err!(NotFound("event {idx} supersedes nothing")))
}

#[implement(Service)]
pub fn count_refs(&self, target: EventIdx, kind: RefKind) -> usize {
	self.referrers(target, kind)
		.filter(Result::is_ok)
		.count()
}
