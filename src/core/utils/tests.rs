use super::*;

#[test]
fn u64_round_trip() {
	for val in [0_u64, 1, 255, 256, u64::MAX] {
		assert_eq!(u64_from_u8(&u64_to_u8(val)), val);
	}
}

#[test]
fn u64_key_order_is_numeric_order() {
	let smaller = u64_to_u8(255);
	let larger = u64_to_u8(256);
	assert!(smaller < larger, "big-endian keys sort numerically");
}

#[test]
fn checked_u64_rejects_bad_width() {
	assert!(checked_u64_from_u8(&[0_u8; 7]).is_err());
	assert!(checked_u64_from_u8(&[0_u8; 8]).is_ok());
}
