//! # iBUS Protocol Constants and Types
//!
//! Core protocol definitions for iBUS servo frames.

/// iBUS frame start marker (first byte of every frame)
pub const IBUS_START_BYTE: u8 = 0x20;

/// iBUS servo command marker (second byte of every frame)
pub const IBUS_COMMAND_SERVO: u8 = 0x2C;

/// Total frame size: start(1) + command(1) + channels(28) + checksum(2)
pub const IBUS_FRAME_SIZE: usize = 32;

/// Number of bytes covered by the checksum (everything but the checksum itself)
pub const IBUS_CHECKSUM_SPAN: usize = 30;

/// Number of channels carried in one frame
pub const IBUS_NUM_CHANNELS: usize = 14;

/// Channel value range (pulse width in microseconds)
pub const CHANNEL_VALUE_MIN: u16 = 1000;
pub const CHANNEL_VALUE_MAX: u16 = 2000;
pub const CHANNEL_VALUE_CENTER: u16 = 1500;

/// Channel array type (14 channels, 16-bit values)
pub type ChannelSet = [u16; IBUS_NUM_CHANNELS];

/// Encoded iBUS frame
pub type IbusFrame = [u8; IBUS_FRAME_SIZE];

/// Channel indices for the stick axes (AETR order).
///
/// Indices 4..14 are auxiliary channels with no fixed meaning.
pub mod channels {
    /// Aileron
    pub const ROLL: usize = 0;
    /// Elevator
    pub const PITCH: usize = 1;
    /// Throttle
    pub const THROTTLE: usize = 2;
    /// Rudder
    pub const YAW: usize = 3;
}

/// Neutral channel set: sticks centered, throttle at minimum, aux centered.
///
/// Used as the startup value of the shared channel state and as the default
/// failsafe set.
pub fn neutral_channels() -> ChannelSet {
    let mut set = [CHANNEL_VALUE_CENTER; IBUS_NUM_CHANNELS];
    set[channels::THROTTLE] = CHANNEL_VALUE_MIN;
    set
}

/// Check whether a value lies in the nominal 1000..=2000 range
pub fn is_nominal(value: u16) -> bool {
    (CHANNEL_VALUE_MIN..=CHANNEL_VALUE_MAX).contains(&value)
}
