//! # iBUS Protocol Module
//!
//! Implementation of the FlySky iBUS servo protocol used to feed channel values
//! to the flight controller over a UART.
//!
//! This module handles:
//! - 32-byte frame encoding (14 channels, 16-bit little-endian)
//! - 16-bit subtractive checksum calculation
//! - Frame validation and decoding (diagnostics and loopback tests)

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod checksum;
