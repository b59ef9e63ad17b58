use ruma::RoomVersionId;

use crate::{Result, err};

/// Capability flags derived from a room version. Authorization and
/// redaction behavior is parameterized on these rather than on version
/// comparisons scattered through the rules.
#[derive(Clone, Debug)]
pub struct RoomVersion {
	pub id: RoomVersionId,

	/// Rooms accept m.room.member events with membership knock.
	pub knocking: bool,

	/// The restricted join rule and join_authorised_via_users_server.
	pub restricted_join_rule: bool,

	/// Updated redaction rules; the room creator is the create sender.
	pub updated_rules: bool,
}

impl RoomVersion {
	/// Version string carried by create event contents which omit one.
	pub const DEFAULT: &'static str = "1";

	pub fn rules(version: &str) -> Result<Self> {
		let id = RoomVersionId::try_from(version)?;
		Self::from_id(id)
	}

	pub fn from_id(id: RoomVersionId) -> Result<Self> {
		use RoomVersionId::{V1, V2, V3, V4, V5, V6, V7, V8, V9, V10, V11};

		match id {
			| V1 | V2 | V3 | V4 | V5 | V6 => Ok(Self {
				id,
				knocking: false,
				restricted_join_rule: false,
				updated_rules: false,
			}),
			| V7 => Ok(Self {
				id,
				knocking: true,
				restricted_join_rule: false,
				updated_rules: false,
			}),
			| V8 | V9 | V10 => Ok(Self {
				id,
				knocking: true,
				restricted_join_rule: true,
				updated_rules: false,
			}),
			| V11 => Ok(Self {
				id,
				knocking: true,
				restricted_join_rule: true,
				updated_rules: true,
			}),
			| _ => Err(err!(Unsupported("room version {id} is not supported"))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_version_is_supported() {
		let rules = RoomVersion::rules(RoomVersion::DEFAULT).expect("v1 supported");
		assert!(!rules.knocking);
	}

	#[test]
	fn modern_version_flags() {
		let rules = RoomVersion::rules("11").expect("v11 supported");
		assert!(rules.knocking);
		assert!(rules.restricted_join_rule);
		assert!(rules.updated_rules);
	}

	#[test]
	fn garbage_version_is_rejected() {
		assert!(RoomVersion::rules("not-a-version").is_err());
	}
}
