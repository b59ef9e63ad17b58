use maelstrom_core::Result;
use ruma::{EventId, OwnedEventId, OwnedRoomId, RoomId, events::StateEventType};

use super::Service;
use crate::rooms::EventIdx;

/// A state resolver fixed to one query point: the present tip, or the
/// room as it stood at an anchor event. Whether the view is present is
/// computed once at open; a view can only age out of presence, never
/// into it, so the cached answer stays valid for the view's lifetime.
pub struct RoomView<'a> {
	service: &'a Service,
	room_id: OwnedRoomId,
	anchor: Option<Anchor>,
	present: bool,
}

struct Anchor {
	event_id: OwnedEventId,
	depth: u64,
}

impl<'a> RoomView<'a> {
	pub(super) async fn open(
		service: &'a Service,
		room_id: &RoomId,
		anchor: Option<&EventId>,
	) -> Result<Self> {
		let anchor = match anchor {
			| None => None,
			| Some(event_id) => {
				let idx = service.services.short.get_idx(event_id).await?;
				let depth = service.services.timeline.get_depth(idx).await?;
				Some(Anchor { event_id: event_id.to_owned(), depth })
			},
		};

		let present = match &anchor {
			| None => true,
			| Some(anchor) => service
				.services
				.state
				.head(room_id)
				.await
				.is_ok_and(|(head, _)| head == anchor.event_id),
		};

		Ok(Self { service, room_id: room_id.to_owned(), anchor, present })
	}

	/// True when this view reflects the room's current tip; the fast
	/// columns are only consulted while this holds.
	#[inline]
	#[must_use]
	pub fn present(&self) -> bool { self.present }

	#[inline]
	#[must_use]
	pub fn anchor(&self) -> Option<&EventId> {
		self.anchor
			.as_ref()
			.map(|anchor| anchor.event_id.as_ref())
	}

	pub async fn get(&self, kind: &StateEventType, state_key: &str) -> Result<EventIdx> {
		match (&self.anchor, self.present) {
			| (_, true) | (None, _) => self
				.service
				.state_get_idx(&self.room_id, kind, state_key)
				.await,
			| (Some(anchor), false) => self
				.service
				.state_get_idx_at(&self.room_id, anchor.depth, kind, state_key)
				.await,
		}
	}

	pub async fn has(&self, kind: &StateEventType, state_key: &str) -> bool {
		self.get(kind, state_key).await.is_ok()
	}

	/// Every (type, state_key, event_idx) of the view's state mapping.
	pub async fn full(&self) -> Result<Vec<(String, String, EventIdx)>> {
		match (&self.anchor, self.present) {
			| (_, true) | (None, _) => self
				.service
				.state_full(&self.room_id)
				.collect(),
			| (Some(anchor), false) => self
				.service
				.state_full_at(&self.room_id, anchor.depth)
				.await,
		}
	}

	pub async fn count(&self, kind: Option<&StateEventType>) -> Result<usize> {
		let full = self.full().await?;

		Ok(match kind {
			| Some(kind) => {
				let kind = kind.to_string();
				full.iter()
					.filter(|(k, ..)| *k == kind)
					.count()
			},
			| None => full.len(),
		})
	}
}
