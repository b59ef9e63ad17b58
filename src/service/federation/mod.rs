use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use maelstrom_core::{Result, err, implement};
use ruma::{CanonicalJsonObject, EventId, RoomId, ServerName};

use crate::service;

/// The transport seam. The HTTP federation client lives outside the core;
/// whatever implements this trait is expected to sign outgoing requests
/// and to have verified the responding server's signatures.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Retrieve one event from a remote server.
	async fn fetch_event(
		&self,
		origin: &ServerName,
		event_id: &EventId,
	) -> Result<CanonicalJsonObject>;

	/// Propose an invite event to the invitee's server; the remote
	/// countersigns and returns it.
	async fn send_invite(
		&self,
		target: &ServerName,
		room_id: &RoomId,
		event_id: &EventId,
		event: CanonicalJsonObject,
	) -> Result<CanonicalJsonObject>;
}

pub struct Service {
	transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl crate::Service for Service {
	fn build(_args: &crate::Args<'_>) -> Result<Arc<Self>> {
		Ok(Arc::new(Self { transport: RwLock::new(None) }))
	}

	fn name(&self) -> &str { service::make_name(std::module_path!()) }
}

#[implement(Service)]
pub fn set_transport(&self, transport: Arc<dyn Transport>) {
	*self
		.transport
		.write()
		.expect("transport lock is never poisoned") = Some(transport);
}

#[implement(Service)]
fn transport(&self) -> Result<Arc<dyn Transport>> {
	self.transport
		.read()
		.expect("transport lock is never poisoned")
		.clone()
		.ok_or_else(|| err!(Unsupported("no federation transport is configured")))
}

#[implement(Service)]
pub async fn fetch_event(
	&self,
	origin: &ServerName,
	event_id: &EventId,
) -> Result<CanonicalJsonObject> {
	self.transport()?.fetch_event(origin, event_id).await
}

#[implement(Service)]
pub async fn send_invite(
	&self,
	target: &ServerName,
	room_id: &RoomId,
	event_id: &EventId,
	event: CanonicalJsonObject,
) -> Result<CanonicalJsonObject> {
	self.transport()?
		.send_invite(target, room_id, event_id, event)
		.await
}
