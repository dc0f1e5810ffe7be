//! # iBUS Checksum
//!
//! 16-bit subtractive checksum: start at 0xFFFF and subtract every byte,
//! wrapping on underflow. Stored little-endian in the last two frame bytes.

use super::protocol::{IbusFrame, IBUS_CHECKSUM_SPAN, IBUS_FRAME_SIZE};

/// Initial accumulator value
const CHECKSUM_SEED: u16 = 0xFFFF;

/// Calculate the iBUS checksum over `data`
///
/// # Arguments
///
/// * `data` - Bytes to checksum (the first 30 bytes of a frame)
///
/// # Returns
///
/// * `u16` - Checksum value
///
/// # Examples
///
/// ```
/// use wifi_ibus_bridge::ibus::checksum::ibus_checksum;
///
/// assert_eq!(ibus_checksum(&[]), 0xFFFF);
/// assert_eq!(ibus_checksum(&[0x20, 0x2C]), 0xFFFF - 0x20 - 0x2C);
/// ```
pub fn ibus_checksum(data: &[u8]) -> u16 {
    data.iter()
        .fold(CHECKSUM_SEED, |acc, &byte| acc.wrapping_sub(byte as u16))
}

/// Verify the checksum stored in the last two bytes of a frame
pub fn verify_frame_checksum(frame: &IbusFrame) -> bool {
    let stored = u16::from_le_bytes([frame[IBUS_FRAME_SIZE - 2], frame[IBUS_FRAME_SIZE - 1]]);
    stored == ibus_checksum(&frame[..IBUS_CHECKSUM_SPAN])
}

/// Reference implementation: 0xFFFF minus the plain byte sum, modulo 2^16.
///
/// Used for testing the wrapping fold.
#[allow(dead_code)]
fn ibus_checksum_by_sum(data: &[u8]) -> u16 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    (0xFFFFu32.wrapping_sub(sum) & 0xFFFF) as u16
}
