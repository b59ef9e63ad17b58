use std::{collections::HashSet, time::Duration};

use maelstrom_core::{Pdu, Result, err, implement};
use ruma::{CanonicalJsonObject, OwnedEventId, OwnedServerName};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Opts, Service};

#[derive(Deserialize)]
struct ExtractEdges {
	#[serde(default)]
	prev_events: Vec<OwnedEventId>,

	#[serde(default)]
	auth_events: Vec<OwnedEventId>,
}

/// Acquire any referenced events we do not hold, through the federation
/// collaborator. Bounded in fanout by `fetch_limit` and in time by
/// `fetch_timeout`; the whole pipeline suspends here and nowhere writes.
#[implement(Service)]
#[tracing::instrument(skip(self, pdu, opts), level = "debug")]
pub(super) async fn fetch_dependencies(&self, pdu: &Pdu, opts: &Opts) -> Result {
	let mut missing = Vec::new();
	for event_id in pdu.prev_events.iter().chain(pdu.auth_events.iter()) {
		if !self.services.timeline.pdu_exists(event_id).await {
			missing.push(event_id.clone());
		}
	}

	if missing.is_empty() {
		return Ok(());
	}

	let Some(origin) = opts.origin.clone() else {
		return Err(err!(NotFound(
			"event {} references unknown events and no origin can supply them",
			pdu.event_id
		)));
	};

	let timeout = Duration::from_secs(self.services.server.config.fetch_timeout);
	tokio::time::timeout(timeout, self.fetch_missing(origin, missing))
		.await
		.map_err(|_| err!(Timeout("dependency fetch deadline elapsed")))?
}

/// Walk the unknown closure depth-first, then ingest in reverse so
/// parents land before children.
#[implement(Service)]
async fn fetch_missing(&self, origin: OwnedServerName, missing: Vec<OwnedEventId>) -> Result {
	let limit = self.services.server.config.fetch_limit;
	let mut pending = missing;
	let mut seen: HashSet<OwnedEventId> = pending.iter().cloned().collect();
	let mut acquired: Vec<(OwnedEventId, CanonicalJsonObject)> = Vec::new();

	while let Some(event_id) = pending.pop() {
		if self.services.timeline.pdu_exists(&event_id).await {
			continue;
		}

		if acquired.len() >= limit {
			return Err(err!(
				"dependency closure exceeds the fetch limit of {limit} events"
			));
		}

		let value = self
			.services
			.federation
			.fetch_event(&origin, &event_id)
			.await?;

		let edges: ExtractEdges = serde_json::to_value(&value)
			.and_then(serde_json::from_value)
			.map_err(|e| err!(BadServerResponse("fetched event is malformed: {e}")))?;

		for referenced in edges
			.prev_events
			.into_iter()
			.chain(edges.auth_events)
		{
			if seen.insert(referenced.clone()) {
				pending.push(referenced);
			}
		}

		debug!(%event_id, acquired = acquired.len(), "fetched dependency");
		acquired.push((event_id, value));
	}

	for (event_id, value) in acquired.into_iter().rev() {
		if let Err(e) = self.ingest_fetched(&origin, value).await {
			warn!(%event_id, "fetched dependency rejected: {e}");
			return Err(e);
		}
	}

	Ok(())
}

/// Type-erased so the ingest/fetch recursion has a finite future type.
#[implement(Service)]
fn ingest_fetched<'a>(
	&'a self,
	origin: &'a OwnedServerName,
	value: CanonicalJsonObject,
) -> futures::future::BoxFuture<'a, Result> {
	use futures::FutureExt;

	async move {
		#[derive(Deserialize)]
		struct ExtractRoom {
			room_id: ruma::OwnedRoomId,
		}

		let room: ExtractRoom = serde_json::to_value(&value)
			.and_then(serde_json::from_value)
			.map_err(|e| err!(BadServerResponse("fetched event has no room_id: {e}")))?;

		self.handle_incoming(origin, &room.room_id, value, Opts::federation(origin.clone()))
			.await
			.map(|_| ())
	}
	.boxed()
}
