use std::sync::Arc;

use async_trait::async_trait;
use maelstrom_core::{Pdu, Result};
use ruma::events::TimelineEventType;
use tracing::debug;

use super::Hook;

/// Applies committed redactions to their targets: the target's stored
/// content is stripped to the protected keys and the redaction recorded
/// under its unsigned. Runs after commit; an unknown target is left for a
/// later ingest to resolve.
pub struct RedactionHook {
	services: Arc<crate::OnceServices>,
}

impl RedactionHook {
	pub(crate) fn new(services: Arc<crate::OnceServices>) -> Self { Self { services } }
}

#[async_trait]
impl Hook for RedactionHook {
	fn kind(&self) -> Option<TimelineEventType> { Some(TimelineEventType::RoomRedaction) }

	async fn handle(&self, pdu: &Pdu) -> Result {
		debug!(event_id = %pdu.event_id, redacts = ?pdu.redacts, "applying redaction");
		self.services.timeline.redact_pdu(pdu).await
	}
}
