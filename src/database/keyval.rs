//! Key construction for composite columns.
//!
//! String segments are joined by a `0xFF` separator, a byte which never
//! occurs in valid UTF-8, so identifiers, event types and state keys split
//! unambiguously. Integer segments are fixed-width big-endian so the
//! lexicographic order of keys equals their numeric order; they carry no
//! separator and are peeled off the tail by width.

use maelstrom_core::{Result, err, utils};

pub type KeyVal = (Vec<u8>, Vec<u8>);

/// Segment separator; 0xFF never occurs in valid UTF-8.
pub const SEP: u8 = 0xFF;

#[inline]
#[must_use]
pub fn key2(a: &str, b: &str) -> Vec<u8> {
	let mut key = Vec::with_capacity(a.len() + 1 + b.len());
	key.extend_from_slice(a.as_bytes());
	key.push(SEP);
	key.extend_from_slice(b.as_bytes());
	key
}

#[inline]
#[must_use]
pub fn key3(a: &str, b: &str, c: &str) -> Vec<u8> {
	let mut key = key2(a, b);
	key.push(SEP);
	key.extend_from_slice(c.as_bytes());
	key
}

/// Prefix for scanning every key beginning with the segments given.
#[inline]
#[must_use]
pub fn prefix(segments: &[&str]) -> Vec<u8> {
	let mut key = Vec::new();
	for segment in segments {
		key.extend_from_slice(segment.as_bytes());
		key.push(SEP);
	}
	key
}

/// Append a fixed-width integer segment.
#[inline]
pub fn push_u64(key: &mut Vec<u8>, val: u64) {
	key.extend_from_slice(&utils::u64_to_u8(val));
}

pub fn split2(key: &[u8]) -> Result<(&str, &str)> {
	let sep = find_sep(key)?;
	Ok((utils::str_from_u8(&key[..sep])?, utils::str_from_u8(&key[sep.saturating_add(1)..])?))
}

pub fn split3(key: &[u8]) -> Result<(&str, &str, &str)> {
	let sep = find_sep(key)?;
	let (b, c) = split2(&key[sep.saturating_add(1)..])?;
	Ok((utils::str_from_u8(&key[..sep])?, b, c))
}

/// Split a trailing fixed-width integer off a key.
pub fn split_u64_tail(key: &[u8]) -> Result<(&[u8], u64)> {
	if key.len() < 8 {
		return Err(err!(Database("key too short for a u64 tail")));
	}

	let (head, tail) = key.split_at(key.len() - 8);
	Ok((head, utils::u64_from_u8(tail)))
}

/// Strip one trailing separator, as left by a `prefix` scan remainder.
#[must_use]
pub fn trim_sep(key: &[u8]) -> &[u8] {
	key.strip_suffix(&[SEP]).unwrap_or(key)
}

fn find_sep(key: &[u8]) -> Result<usize> {
	key.iter()
		.position(|&b| b == SEP)
		.ok_or_else(|| err!(Database("composite key is missing a separator")))
}
