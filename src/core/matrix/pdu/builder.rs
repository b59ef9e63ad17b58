use ruma::{MilliSecondsSinceUnixEpoch, OwnedEventId, events::TimelineEventType};
use serde_json::value::RawValue as RawJsonValue;

/// Locally-authored event before the pipeline fills in the graph placement,
/// hashes and signature.
#[derive(Debug, Clone)]
pub struct Builder {
	pub event_type: TimelineEventType,

	pub content: Box<RawJsonValue>,

	pub unsigned: Option<Box<RawJsonValue>>,

	pub state_key: Option<String>,

	pub redacts: Option<OwnedEventId>,

	/// For timestamped messaging; overrides the pipeline's clock.
	pub timestamp: Option<MilliSecondsSinceUnixEpoch>,
}
