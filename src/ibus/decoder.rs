//! # iBUS Frame Decoder
//!
//! Validates an iBUS servo frame and recovers its channel values. The bridge
//! only transmits frames; decoding is used to check what went out on the wire.

use bytes::Buf;

use super::checksum::verify_frame_checksum;
use super::protocol::*;
use crate::error::{BridgeError, Result};

/// Decode a complete iBUS frame
///
/// # Arguments
///
/// * `frame` - Frame bytes (must be exactly 32)
///
/// # Returns
///
/// * `Result<ChannelSet>` - Decoded channels, or error if invalid
///
/// # Errors
///
/// Returns error if:
/// - Frame is not 32 bytes long
/// - Start or command byte is incorrect
/// - Checksum check fails
pub fn decode_frame(frame: &[u8]) -> Result<ChannelSet> {
    let frame: &IbusFrame = frame.try_into().map_err(|_| {
        BridgeError::Protocol(format!(
            "Invalid frame size: expected {} bytes, got {}",
            IBUS_FRAME_SIZE,
            frame.len()
        ))
    })?;

    if frame[0] != IBUS_START_BYTE {
        return Err(BridgeError::Protocol(
            format!("Invalid start byte: 0x{:02X}", frame[0])
        ));
    }

    if frame[1] != IBUS_COMMAND_SERVO {
        return Err(BridgeError::Protocol(
            format!("Invalid command byte: 0x{:02X}", frame[1])
        ));
    }

    if !verify_frame_checksum(frame) {
        return Err(BridgeError::Protocol(format!(
            "Checksum mismatch: stored 0x{:04X}",
            u16::from_le_bytes([frame[30], frame[31]])
        )));
    }

    let mut payload = &frame[2..IBUS_CHECKSUM_SPAN];
    let mut channels = [0u16; IBUS_NUM_CHANNELS];
    for ch in channels.iter_mut() {
        *ch = payload.get_u16_le();
    }

    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibus::encoder::encode_frame;

    #[test]
    fn test_decode_encoded_frame() {
        let channels = [1000, 1100, 1200, 1300, 1400, 1500, 1600, 1700, 1800, 1900, 2000, 1234, 1777, 1500];
        let frame = encode_frame(&channels);
        assert_eq!(decode_frame(&frame).unwrap(), channels);
    }

    #[test]
    fn test_decode_wrong_size() {
        let result = decode_frame(&[0x20, 0x2C, 0x00]);
        match result {
            Err(BridgeError::Protocol(msg)) => assert!(msg.contains("got 3")),
            other => panic!("Expected Protocol error, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_bad_start_byte() {
        let mut frame = encode_frame(&neutral_channels());
        frame[0] = 0x55;
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_bad_command_byte() {
        let mut frame = encode_frame(&neutral_channels());
        frame[1] = 0x40;
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_corrupted_payload() {
        let mut frame = encode_frame(&neutral_channels());
        frame[10] = frame[10].wrapping_add(1);
        match decode_frame(&frame) {
            Err(BridgeError::Protocol(msg)) => assert!(msg.contains("Checksum mismatch")),
            other => panic!("Expected checksum error, got: {:?}", other),
        }
    }
}
