pub mod auth;
pub mod pdu;
pub mod power;
pub mod room_version;

pub use auth::AuthError;
pub use pdu::{Pdu, PduBuilder, gen_event_id};
pub use power::RoomPower;
pub use room_version::RoomVersion;

/// Tuned state-key string. The common cases are the empty string and a user
/// mxid; both fit inline.
pub type StateKey = smallstr::SmallString<[u8; 48]>;
