//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; an empty file yields the same
//! configuration as [`Config::default`].

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::ibus::protocol::{
    is_nominal, neutral_channels, ChannelSet, IBUS_NUM_CHANNELS,
};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub failsafe: FailsafeConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Network and discovery configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_interface")]
    pub interface: String,

    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    #[serde(default = "default_control_port")]
    pub control_port: u16,

    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: Ipv4Addr,

    /// Address to announce; auto-detected when absent
    #[serde(default)]
    pub advertise_address: Option<Ipv4Addr>,

    #[serde(default = "default_announce_interval_ms")]
    pub announce_interval_ms: u64,

    /// Channel values per control datagram (payload = 2 bytes each)
    #[serde(default = "default_control_channels")]
    pub control_channels: usize,
}

/// Link supervisor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_frame_period_ms")]
    pub frame_period_ms: u64,

    #[serde(default = "default_status_log_interval_frames")]
    pub status_log_interval_frames: u64,
}

/// Failsafe configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FailsafeConfig {
    /// 14 channel values held while the link is down
    #[serde(default)]
    pub channels: Option<Vec<u16>>,

    /// Peer silence that counts as link loss; 0 disables
    #[serde(default)]
    pub peer_timeout_ms: u64,
}

/// Link event journal configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Diagnostic log configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Also write daily-rolling log files here
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyAMA0".to_string() }
fn default_baud_rate() -> u32 { 115200 }

fn default_interface() -> String { "wlan0".to_string() }
fn default_discovery_port() -> u16 { 8888 }
fn default_control_port() -> u16 { 9877 }
fn default_broadcast_address() -> Ipv4Addr { Ipv4Addr::BROADCAST }
fn default_announce_interval_ms() -> u64 { 1000 }
fn default_control_channels() -> usize { 4 }

fn default_frame_period_ms() -> u64 { 7 }
fn default_status_log_interval_frames() -> u64 { 1000 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            discovery_port: default_discovery_port(),
            control_port: default_control_port(),
            broadcast_address: default_broadcast_address(),
            advertise_address: None,
            announce_interval_ms: default_announce_interval_ms(),
            control_channels: default_control_channels(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            frame_period_ms: default_frame_period_ms(),
            status_log_interval_frames: default_status_log_interval_frames(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl NetworkConfig {
    /// Where announcements are sent
    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::from((self.broadcast_address, self.discovery_port))
    }

    /// Discovery tick period (announcements go out every other tick)
    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }
}

impl LinkConfig {
    /// Supervisor tick period
    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_period_ms)
    }
}

impl FailsafeConfig {
    /// Failsafe channel set; neutral sticks and minimum throttle unless configured
    pub fn channel_set(&self) -> ChannelSet {
        let mut set = neutral_channels();
        if let Some(values) = &self.channels {
            if values.len() == IBUS_NUM_CHANNELS {
                set.copy_from_slice(values);
            }
        }
        set
    }

    /// Peer silence timeout, `None` when disabled
    pub fn peer_timeout(&self) -> Option<Duration> {
        (self.peer_timeout_ms > 0).then(|| Duration::from_millis(self.peer_timeout_ms))
    }
}

fn invalid(msg: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wifi_ibus_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if ![9600, 19200, 38400, 57600, 115200].contains(&self.serial.baud_rate) {
            return Err(invalid("baud_rate must be one of: 9600, 19200, 38400, 57600, 115200"));
        }

        // Network
        if self.network.interface.is_empty() {
            return Err(invalid("network interface cannot be empty"));
        }

        if self.network.discovery_port == 0 || self.network.control_port == 0 {
            return Err(invalid("discovery_port and control_port must be non-zero"));
        }

        if self.network.discovery_port == self.network.control_port {
            return Err(invalid("discovery_port and control_port must differ"));
        }

        if self.network.announce_interval_ms == 0 || self.network.announce_interval_ms > 60000 {
            return Err(invalid("announce_interval_ms must be between 1 and 60000"));
        }

        if self.network.control_channels == 0 || self.network.control_channels > IBUS_NUM_CHANNELS {
            return Err(invalid(format!(
                "control_channels must be between 1 and {}", IBUS_NUM_CHANNELS
            )));
        }

        // Link
        if self.link.frame_period_ms == 0 || self.link.frame_period_ms > 100 {
            return Err(invalid("frame_period_ms must be between 1 and 100"));
        }

        if self.link.status_log_interval_frames == 0 {
            return Err(invalid("status_log_interval_frames must be greater than 0"));
        }

        // Failsafe
        if let Some(channels) = &self.failsafe.channels {
            if channels.len() != IBUS_NUM_CHANNELS {
                return Err(invalid(format!(
                    "failsafe channels must list exactly {} values (got {})",
                    IBUS_NUM_CHANNELS,
                    channels.len()
                )));
            }

            if let Some((idx, value)) = channels.iter().enumerate().find(|(_, v)| !is_nominal(**v)) {
                return Err(invalid(format!(
                    "failsafe channel {} value {} is outside 1000..=2000", idx, value
                )));
            }
        }

        if self.failsafe.peer_timeout_ms > 60000 {
            return Err(invalid("peer_timeout_ms must be between 0 (disabled) and 60000"));
        }

        if let Some(timeout) = self.failsafe.peer_timeout() {
            if timeout <= self.link.frame_period() {
                return Err(invalid("peer_timeout_ms must be longer than frame_period_ms"));
            }
        }

        // Telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        // Logging
        if matches!(&self.logging.log_dir, Some(dir) if dir.is_empty()) {
            return Err(invalid("logging log_dir cannot be empty when set"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn load_str(toml_content: &str) -> Result<Config> {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        Config::load(temp_file.path())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        let config = load_str("").unwrap();
        assert_eq!(config.serial.port, "/dev/ttyAMA0");
        assert_eq!(config.network.discovery_port, 8888);
        assert_eq!(config.network.control_port, 9877);
        assert_eq!(config.link.frame_period(), Duration::from_millis(7));
        assert!(config.failsafe.peer_timeout().is_none());
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn test_load_config_from_file() {
        let config = load_str(r#"
[serial]
port = "/dev/ttyUSB0"

[network]
interface = "wlp2s0"
advertise_address = "192.168.4.1"
broadcast_address = "192.168.4.255"
control_channels = 5

[link]
frame_period_ms = 10

[failsafe]
channels = [1500, 1500, 1100, 1500, 1000, 1500, 1500, 1500, 1500, 1500, 1500, 1500, 1500, 1500]
peer_timeout_ms = 500
"#).unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.network.interface, "wlp2s0");
        assert_eq!(config.network.advertise_address, Some(Ipv4Addr::new(192, 168, 4, 1)));
        assert_eq!(
            config.network.broadcast_target(),
            "192.168.4.255:8888".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.network.control_channels, 5);
        assert_eq!(config.failsafe.channel_set()[2], 1100);
        assert_eq!(config.failsafe.channel_set()[4], 1000);
        assert_eq!(config.failsafe.peer_timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_load_rejects_bad_address() {
        assert!(load_str("[network]\nadvertise_address = \"not-an-ip\"\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        match Config::load("/nonexistent/bridge.toml") {
            Err(BridgeError::Io(_)) => {}
            other => panic!("Expected Io error, got: {:?}", other),
        }
    }

    #[test]
    fn test_default_failsafe_is_neutral() {
        assert_eq!(FailsafeConfig::default().channel_set(), neutral_channels());
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = Config::default();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in &[9600, 19200, 38400, 57600, 115200] {
            let mut config = Config::default();
            config.serial.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_empty_interface() {
        let mut config = Config::default();
        config.network.interface = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_port() {
        let mut config = Config::default();
        config.network.control_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_ports() {
        let mut config = Config::default();
        config.network.control_port = config.network.discovery_port;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_announce_interval_bounds() {
        let mut config = Config::default();
        config.network.announce_interval_ms = 0;
        assert!(config.validate().is_err());
        config.network.announce_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_control_channels_bounds() {
        let mut config = Config::default();
        config.network.control_channels = 0;
        assert!(config.validate().is_err());
        config.network.control_channels = 15;
        assert!(config.validate().is_err());
        config.network.control_channels = 14;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frame_period_bounds() {
        let mut config = Config::default();
        config.link.frame_period_ms = 0;
        assert!(config.validate().is_err());
        config.link.frame_period_ms = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_status_log_interval_zero() {
        let mut config = Config::default();
        config.link.status_log_interval_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_failsafe_wrong_length() {
        let mut config = Config::default();
        config.failsafe.channels = Some(vec![1500; 13]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_failsafe_out_of_range() {
        let mut config = Config::default();
        let mut channels = vec![1500; IBUS_NUM_CHANNELS];
        channels[2] = 900;
        config.failsafe.channels = Some(channels);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_peer_timeout_bounds() {
        let mut config = Config::default();
        config.failsafe.peer_timeout_ms = 60001;
        assert!(config.validate().is_err());

        config.failsafe.peer_timeout_ms = 5; // shorter than one frame period
        assert!(config.validate().is_err());

        config.failsafe.peer_timeout_ms = 250;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = Config::default();
        config.telemetry.enabled = true;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.telemetry.enabled = false;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_records_per_file_zero() {
        let mut config = Config::default();
        config.telemetry.max_records_per_file = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_files_to_keep_zero() {
        let mut config = Config::default();
        config.telemetry.max_files_to_keep = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_logging_dir() {
        let mut config = Config::default();
        config.logging.log_dir = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_serial_port(), "/dev/ttyAMA0");
        assert_eq!(default_baud_rate(), 115200);
        assert_eq!(default_interface(), "wlan0");
        assert_eq!(default_discovery_port(), 8888);
        assert_eq!(default_control_port(), 9877);
        assert_eq!(default_broadcast_address(), Ipv4Addr::new(255, 255, 255, 255));
        assert_eq!(default_announce_interval_ms(), 1000);
        assert_eq!(default_control_channels(), 4);
        assert_eq!(default_frame_period_ms(), 7);
        assert_eq!(default_status_log_interval_frames(), 1000);
        assert_eq!(default_log_dir(), "./logs");
        assert_eq!(default_max_records_per_file(), 10000);
        assert_eq!(default_max_files_to_keep(), 10);
    }
}
