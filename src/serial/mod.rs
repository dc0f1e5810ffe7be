//! # Serial Communication Module
//!
//! Handles the UART link to the flight controller.
//!
//! This module handles:
//! - Opening the serial port (8N1, 115200 baud by default)
//! - Writing complete iBUS frames, one at a time
//! - Waiting for each frame to be handed to the driver before the next

pub mod port_trait;

use crate::error::{BridgeError, Result};
use crate::ibus::protocol::IbusFrame;
use port_trait::{SerialPortIO, TokioSerialPort};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

/// Standard iBUS baud rate
pub const IBUS_BAUD_RATE: u32 = 115_200;

/// Default UART device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyAMA0", // On-board PL011 UART (Raspberry Pi)
    "/dev/serial0", // Distribution alias for the primary UART
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// iBUS serial port handler
///
/// Owns the only writer to the flight controller; frames are written and
/// flushed strictly one after another.
pub struct IbusSerial<P = TokioSerialPort> {
    /// Serial port handle
    port: P,
    /// Device path (e.g., /dev/ttyAMA0)
    device_path: String,
}

impl<P> std::fmt::Debug for IbusSerial<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IbusSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl IbusSerial<TokioSerialPort> {
    /// Open the flight controller UART
    ///
    /// Auto-detects the device by trying common paths.
    ///
    /// # Errors
    ///
    /// Returns error if no device could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wifi_ibus_bridge::serial::{IbusSerial, IBUS_BAUD_RATE};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let serial = IbusSerial::open(IBUS_BAUD_RATE)?;
    ///     println!("Connected to: {}", serial.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(baud_rate: u32) -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Open the flight controller UART with custom device paths
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyAMA0"])
    /// * `baud_rate` - Line speed
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened flight controller UART at {} ({} baud)", path, baud_rate);
                    return Ok(Self::with_port(TokioSerialPort::new(port), *path));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(BridgeError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with iBUS settings (8N1, no flow control)
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| BridgeError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

impl<P: SerialPortIO> IbusSerial<P> {
    /// Wrap an already opened port
    pub fn with_port(port: P, device_path: impl Into<String>) -> Self {
        Self {
            port,
            device_path: device_path.into(),
        }
    }

    /// Send one iBUS frame to the flight controller
    ///
    /// Resolves once the whole frame has been written and flushed, so the next
    /// frame never overlaps this one.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Serial` if the write or flush fails
    pub async fn send_frame(&mut self, frame: &IbusFrame) -> Result<()> {
        self.port.write_all(frame).await
            .map_err(|e| BridgeError::Serial(format!("Failed to write frame: {}", e)))?;

        self.port.flush().await
            .map_err(|e| BridgeError::Serial(format!("Failed to flush serial port: {}", e)))?;

        trace!("Sent iBUS frame ({} bytes)", frame.len());
        Ok(())
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}
