mod fetch;
mod hooks;
mod incoming;
mod process;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use maelstrom_core::{Pdu, Result};
use ruma::{OwnedServerName, events::TimelineEventType};

use crate::service;

pub use self::hooks::RedactionHook;

/// The single entry point for mutating room state. Every event, local or
/// federated, passes through the staged pipeline in `process`; nothing
/// else writes the room columns.
pub struct Service {
	services: Arc<crate::OnceServices>,
	hooks: RwLock<Vec<Arc<dyn Hook>>>,
}

/// Conformity relaxations for specific known-bad event shapes. A mask bit
/// set in the options waives exactly that check in the conform stage.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NonConform(u32);

impl NonConform {
	/// Sender's origin differs from the origin field; seen on invites
	/// countersigned by the invitee's server.
	pub const MISMATCHED_ORIGIN: Self = Self(1);
	/// Event references no prev_events despite not being a create.
	pub const MISSING_PREV_EVENTS: Self = Self(1 << 1);

	#[inline]
	#[must_use]
	pub fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

	#[inline]
	#[must_use]
	pub fn with(self, other: Self) -> Self { Self(self.0 | other.0) }
}

/// Per-ingest options.
#[derive(Clone, Debug, Default)]
pub struct Opts {
	/// Run hash and signature verification. Disabled for trusted local
	/// re-ingestion; local authorship signs rather than verifies.
	pub verify: bool,

	pub non_conform: NonConform,

	/// Emit a structured info line when the event commits.
	pub infolog_accept: bool,

	/// Server to ask for unknown dependencies; also the claimed origin of
	/// a federated event.
	pub origin: Option<OwnedServerName>,

	/// Room-creation overrides; present only on the create event of a
	/// locally created room.
	pub copts: Option<CreateOpts>,
}

/// Creation-only options.
#[derive(Clone, Debug)]
pub struct CreateOpts {
	pub room_version: Option<String>,
	pub federate: bool,
}

impl Default for CreateOpts {
	fn default() -> Self { Self { room_version: None, federate: true } }
}

impl Opts {
	#[must_use]
	pub fn local() -> Self {
		Self {
			verify: false,
			non_conform: NonConform::default(),
			infolog_accept: true,
			origin: None,
			copts: None,
		}
	}

	#[must_use]
	pub fn federation(origin: OwnedServerName) -> Self {
		Self {
			verify: true,
			non_conform: NonConform::default(),
			infolog_accept: false,
			origin: Some(origin),
			copts: None,
		}
	}
}

/// A typed post-commit callback. Hooks observe committed events; they may
/// enqueue further work but cannot veto the commit.
#[async_trait]
pub trait Hook: Send + Sync {
	/// The event type observed; None observes everything.
	fn kind(&self) -> Option<TimelineEventType>;

	async fn handle(&self, pdu: &Pdu) -> Result;
}

impl crate::Service for Service {
	fn build(args: &crate::Args<'_>) -> Result<Arc<Self>> {
		let service = Arc::new(Self {
			services: args.services.clone(),
			hooks: RwLock::new(Vec::new()),
		});

		service.register_hook(Arc::new(RedactionHook::new(args.services.clone())));

		Ok(service)
	}

	fn name(&self) -> &str { service::make_name(std::module_path!()) }
}

impl Service {
	pub fn register_hook(&self, hook: Arc<dyn Hook>) {
		self.hooks
			.write()
			.expect("hook registry lock is never poisoned")
			.push(hook);
	}

	fn hooks_for(&self, kind: &TimelineEventType) -> Vec<Arc<dyn Hook>> {
		self.hooks
			.read()
			.expect("hook registry lock is never poisoned")
			.iter()
			.filter(|hook| hook.kind().as_ref().is_none_or(|k| k == kind))
			.cloned()
			.collect()
	}
}
