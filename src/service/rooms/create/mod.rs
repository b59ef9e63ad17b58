use std::sync::Arc;

use maelstrom_core::{PduBuilder, Result, err, implement, matrix::RoomVersion};
use ruma::{OwnedRoomId, RoomId, UserId, events::TimelineEventType};
use serde_json::{json, value::to_raw_value};
use tracing::info;

use crate::{rooms::event_handler::{CreateOpts, Opts}, service};

/// The room creation flow: mint a room id, apply the create event, join
/// the creator, and grant them the creator power level.
pub struct Service {
	services: Arc<crate::OnceServices>,
}

impl crate::Service for Service {
	fn build(args: &crate::Args<'_>) -> Result<Arc<Self>> {
		Ok(Arc::new(Self { services: args.services.clone() }))
	}

	fn name(&self) -> &str { service::make_name(std::module_path!()) }
}

#[implement(Service)]
#[tracing::instrument(skip(self, copts), level = "debug")]
pub async fn create_room(&self, sender: &UserId, copts: CreateOpts) -> Result<OwnedRoomId> {
	if !self.services.globals.user_is_local(sender) {
		return Err(err!(AccessDenied("only local users create rooms here")));
	}

	let room_id = RoomId::new(self.services.globals.server_name());

	let version = copts
		.room_version
		.clone()
		.unwrap_or_else(|| self.services.server.config.default_room_version.clone());
	let rules = RoomVersion::rules(&version)
		.map_err(|_| err!(Unsupported("room version {version} is not supported")))?;

	let mut create_content = json!({
		"room_version": version,
		"m.federate": copts.federate,
	});

	// Before the updated rules the creator is named in content.
	if !rules.updated_rules {
		create_content["creator"] = json!(sender);
	}

	let create = PduBuilder {
		event_type: TimelineEventType::RoomCreate,
		content: to_raw_value(&create_content)?,
		unsigned: None,
		state_key: Some(String::new()),
		redacts: None,
		timestamp: None,
	};

	let opts = Opts { copts: Some(copts), ..Opts::local() };
	self.services
		.timeline
		.build_and_append(&room_id, sender, create, &opts)
		.await?;

	// The creator's first join rides directly on the create event.
	let join = PduBuilder {
		event_type: TimelineEventType::RoomMember,
		content: to_raw_value(&json!({ "membership": "join" }))?,
		unsigned: None,
		state_key: Some(sender.to_string()),
		redacts: None,
		timestamp: None,
	};

	self.services
		.timeline
		.build_and_append(&room_id, sender, join, &Opts::local())
		.await?;

	let power_levels = PduBuilder {
		event_type: TimelineEventType::RoomPowerLevels,
		content: to_raw_value(&json!({
			"users": { sender.as_str(): 100 },
		}))?,
		unsigned: None,
		state_key: Some(String::new()),
		redacts: None,
		timestamp: None,
	};

	self.services
		.timeline
		.build_and_append(&room_id, sender, power_levels, &Opts::local())
		.await?;

	info!(%room_id, creator = %sender, %version, "room created");
	Ok(room_id)
}
