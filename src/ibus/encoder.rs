//! # iBUS Frame Encoder
//!
//! Encodes a channel set into a 32-byte iBUS servo frame.

use super::checksum::ibus_checksum;
use super::protocol::*;

/// Encode channels into a complete iBUS frame
///
/// Pure and total: every 14-channel input produces a valid frame. Values are
/// packed as-is, no clamping is applied.
///
/// # Arguments
///
/// * `channels` - Array of 14 channel values
///
/// # Returns
///
/// * `IbusFrame` - 32 bytes: start + command + 14×u16 LE + checksum LE
///
/// # Frame Layout
///
/// ```text
/// Byte 0     : 0x20 (start)
/// Byte 1     : 0x2C (servo command / length)
/// Byte 2..29 : ch0 lo, ch0 hi, ch1 lo, ch1 hi, ... ch13 hi
/// Byte 30..31: checksum lo, checksum hi
/// ```
///
/// # Examples
///
/// ```
/// use wifi_ibus_bridge::ibus::encoder::encode_frame;
///
/// let frame = encode_frame(&[1500u16; 14]);
/// assert_eq!(frame.len(), 32);
/// assert_eq!(&frame[..4], &[0x20, 0x2C, 0xDC, 0x05]);
/// ```
pub fn encode_frame(channels: &ChannelSet) -> IbusFrame {
    let mut frame = [0u8; IBUS_FRAME_SIZE];
    frame[0] = IBUS_START_BYTE;
    frame[1] = IBUS_COMMAND_SERVO;

    for (slot, &value) in frame[2..IBUS_CHECKSUM_SPAN]
        .chunks_exact_mut(2)
        .zip(channels.iter())
    {
        slot.copy_from_slice(&value.to_le_bytes());
    }

    let checksum = ibus_checksum(&frame[..IBUS_CHECKSUM_SPAN]);
    frame[IBUS_CHECKSUM_SPAN..].copy_from_slice(&checksum.to_le_bytes());

    frame
}
