mod builder;
mod redact;
#[cfg(test)]
mod tests;

use std::cmp::Ordering;

use ruma::{
	CanonicalJsonObject, CanonicalJsonValue, EventId, MilliSecondsSinceUnixEpoch, OwnedEventId,
	OwnedRoomId, OwnedServerName, OwnedUserId, RoomVersionId, UInt,
	events::{StateEventType, TimelineEventType, room::member::MembershipState},
};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue as RawJsonValue;
use smallvec::SmallVec;

pub use self::builder::Builder;
pub use self::builder::Builder as PduBuilder;
use super::StateKey;
use crate::{Result, err};

/// Persistent Data Unit (Event)
#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct Pdu {
	#[serde(rename = "type")]
	pub kind: TimelineEventType,

	pub content: Box<RawJsonValue>,

	pub event_id: OwnedEventId,

	pub room_id: OwnedRoomId,

	pub sender: OwnedUserId,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub state_key: Option<StateKey>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub redacts: Option<OwnedEventId>,

	pub prev_events: PrevEvents,

	pub auth_events: AuthEvents,

	pub origin_server_ts: UInt,

	pub depth: UInt,

	pub hashes: EventHashes,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub origin: Option<OwnedServerName>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unsigned: Option<Box<RawJsonValue>>,

	// BTreeMap<Box<ServerName>, BTreeMap<ServerSigningKeyId, String>>
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signatures: Option<Box<RawJsonValue>>,
}

/// Tuned prev_events vector. Most events have one prev_event.
pub type PrevEvents = SmallVec<[OwnedEventId; 1]>;

/// Tuned auth_events vector. Average events have three auth events.
pub type AuthEvents = SmallVec<[OwnedEventId; 3]>;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventHashes {
	pub sha256: String,
}

/// The [maximum size allowed] for a PDU.
/// [maximum size allowed]: https://spec.matrix.org/latest/client-server-api/#size-limits
pub const MAX_PDU_BYTES: usize = 65_535;

/// The [maximum length allowed] for the `prev_events` array of a PDU.
/// [maximum length allowed]: https://spec.matrix.org/latest/rooms/v1/#event-format
pub const MAX_PREV_EVENTS: usize = 20;

/// The [maximum length allowed] for the `auth_events` array of a PDU.
/// [maximum length allowed]: https://spec.matrix.org/latest/rooms/v1/#event-format
pub const MAX_AUTH_EVENTS: usize = 10;

impl Pdu {
	pub fn from_rid_val(
		room_id: &ruma::RoomId,
		event_id: &EventId,
		mut json: CanonicalJsonObject,
	) -> Result<Self> {
		let room_id = CanonicalJsonValue::String(room_id.as_str().into());
		json.insert("room_id".into(), room_id);

		Self::from_id_val(event_id, json)
	}

	pub fn from_id_val(event_id: &EventId, mut json: CanonicalJsonObject) -> Result<Self> {
		let event_id = CanonicalJsonValue::String(event_id.as_str().into());
		json.insert("event_id".into(), event_id);

		Self::from_val(&json)
	}

	pub fn from_val(json: &CanonicalJsonObject) -> Result<Self> {
		serde_json::to_value(json)
			.and_then(serde_json::from_value)
			.map_err(Into::into)
	}

	#[inline]
	#[must_use]
	pub fn is_state(&self) -> bool { self.state_key.is_some() }

	#[inline]
	pub fn state_kind(&self) -> StateEventType { StateEventType::from(self.kind.to_string()) }

	#[inline]
	#[must_use]
	pub fn origin_server_ts(&self) -> MilliSecondsSinceUnixEpoch {
		MilliSecondsSinceUnixEpoch(self.origin_server_ts)
	}

	/// The membership state carried in the content of an m.room.member event.
	pub fn membership(&self) -> Result<MembershipState> {
		#[derive(Deserialize)]
		struct Extract {
			membership: MembershipState,
		}

		self.get_content::<Extract>()
			.map(|c| c.membership)
			.map_err(|e| err!(Conform("missing or invalid membership in content: {e}")))
	}

	pub fn get_content<T>(&self) -> Result<T>
	where
		T: for<'de> Deserialize<'de>,
	{
		serde_json::from_str(self.content.get()).map_err(Into::into)
	}

	/// The wire form: every field except our local event_id annotation.
	pub fn to_canonical_object(&self) -> Result<CanonicalJsonObject> {
		let value = serde_json::to_value(self)?;
		let serde_json::Value::Object(map) = value else {
			return Err(err!("PDU serialized to a non-object"));
		};

		let mut object = ruma::canonical_json::try_from_json_map(map)?;
		object.remove("event_id");
		Ok(object)
	}

	/// Client-facing room event format.
	#[must_use]
	pub fn to_room_event(&self) -> serde_json::Value {
		let mut json = serde_json::json!({
			"content": self.content,
			"event_id": self.event_id,
			"origin_server_ts": self.origin_server_ts,
			"room_id": self.room_id,
			"sender": self.sender,
			"type": self.kind,
		});

		if let Some(state_key) = &self.state_key {
			json["state_key"] = serde_json::json!(state_key.as_str());
		}
		if let Some(redacts) = &self.redacts {
			json["redacts"] = serde_json::json!(redacts);
		}
		if let Some(unsigned) = &self.unsigned {
			json["unsigned"] = serde_json::json!(unsigned);
		}

		json
	}
}

/// Mint the content-addressed event id of a finalized wire-form object.
pub fn gen_event_id(
	value: &CanonicalJsonObject,
	room_version: &RoomVersionId,
) -> Result<OwnedEventId> {
	let reference_hash = ruma::signatures::reference_hash(value, room_version)?;
	let event_id: OwnedEventId = format!("${reference_hash}").try_into()?;

	Ok(event_id)
}

/// Prevent derived equality which wouldn't limit itself to event_id
impl Eq for Pdu {}

/// Equality determined by the Pdu's ID, not the memory representations.
impl PartialEq for Pdu {
	fn eq(&self, other: &Self) -> bool { self.event_id == other.event_id }
}

/// Ordering determined by the Pdu's ID, not the memory representations.
impl Ord for Pdu {
	fn cmp(&self, other: &Self) -> Ordering { self.event_id.cmp(&other.event_id) }
}

/// Ordering determined by the Pdu's ID, not the memory representations.
impl PartialOrd for Pdu {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}
