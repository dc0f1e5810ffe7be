//! # Error Types
//!
//! Custom error types for the WiFi iBUS bridge using `thiserror`.

use thiserror::Error;

/// Main error type for the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// iBUS frame errors (bad markers, checksum mismatch, wrong size)
    #[error("iBUS protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial device could be opened
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Socket setup and discovery errors
    #[error("Network error: {0}")]
    Network(String),

    /// Link event journal errors
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
