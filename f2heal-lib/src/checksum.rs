//! Fletcher-16 checksum used in the BLE frame header.
//!
//! The device seeds the first running sum with 1 and reduces both sums
//! modulo 255. Reducing after every byte gives the same result as reducing
//! once at the end and keeps both sums below 255 for inputs of any length.

use crate::constants::{CHECKSUM_START, FLETCHER_INIT, FLETCHER_MODULUS};

/// Computes the checksum over the checksummed part of a frame (type, length,
/// payload). Returns `(checksum_lo, checksum_hi)` in wire order.
pub fn checksum(bytes: &[u8]) -> (u8, u8) {
    let (sum1, sum2) = bytes.iter().fold((FLETCHER_INIT, 0u32), |(sum1, sum2), &b| {
        let sum1 = (sum1 + u32::from(b)) % FLETCHER_MODULUS;
        (sum1, (sum2 + sum1) % FLETCHER_MODULUS)
    });
    (sum1 as u8, sum2 as u8)
}

/// Same as [`checksum`], packed the way the frame stores it (little-endian u16).
pub fn checksum_u16(bytes: &[u8]) -> u16 {
    let (lo, hi) = checksum(bytes);
    u16::from_le_bytes([lo, hi])
}

/// Checks the two leading checksum bytes of `frame` against bytes `[2..end)`.
///
/// Frames shorter than the checksum field never verify.
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < CHECKSUM_START {
        return false;
    }
    checksum(&frame[CHECKSUM_START..]) == (frame[0], frame[1])
}
