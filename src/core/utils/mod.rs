pub mod mutex_map;
pub mod result;
#[cfg(test)]
mod tests;
pub mod time;

pub use mutex_map::{MutexMap, MutexMapGuard};
pub use result::Result;
pub use time::now_millis;

use crate::Err;

/// Interpret a fixed-width big-endian byte slice as a u64.
#[inline]
#[must_use]
pub fn u64_from_u8(bytes: &[u8]) -> u64 {
	let bytes: [u8; 8] = bytes.try_into().expect("failed to convert [u8] to u64");
	u64::from_be_bytes(bytes)
}

/// Big-endian encoding; lexicographic key order equals numeric order.
#[inline]
#[must_use]
pub fn u64_to_u8(val: u64) -> [u8; 8] { val.to_be_bytes() }

#[inline]
pub fn str_from_u8(bytes: &[u8]) -> Result<&str> {
	std::str::from_utf8(bytes).map_err(Into::into)
}

pub fn string_from_u8(bytes: &[u8]) -> Result<String> {
	str_from_u8(bytes).map(ToOwned::to_owned)
}

/// Parse a u64 stored as a fixed-width big-endian value, surfacing
/// corruption instead of panicking.
pub fn checked_u64_from_u8(bytes: &[u8]) -> Result<u64> {
	if bytes.len() != 8 {
		return Err!(Database("expected 8 byte counter value, found {}", bytes.len()));
	}

	Ok(u64_from_u8(bytes))
}

