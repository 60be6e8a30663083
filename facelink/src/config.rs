//! Configuration
//!
//! Everything the controller reads from the outside world: where the live
//! data should be streamed to, where devices must send their replies, and
//! which devices take part in recordings. `SessionConfig` is the read-only
//! view the controller gets; `Settings` is the YAML-backed implementation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Port on which stream targets receive the live data.
pub const STREAM_TARGET_PORT: u16 = 11111;
/// Port the capture app listens on unless overridden per device.
pub const DEFAULT_DEVICE_PORT: u16 = 8000;
/// Port we listen on for device replies.
pub const DEFAULT_SERVER_PORT: u16 = 6000;

fn default_stream_target_port() -> u16 {
    STREAM_TARGET_PORT
}

fn default_device_port() -> u16 {
    DEFAULT_DEVICE_PORT
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_true() -> bool {
    true
}

/// Read-only view of the configuration, queried on every poll.
pub trait SessionConfig {
    /// Ordered list of machines receiving the live data stream.
    fn stream_targets(&self) -> Vec<StreamTarget>;
    /// Address devices should send their replies to.
    fn listen_address(&self) -> String;
    /// Port devices should send their replies to.
    fn server_port(&self) -> u16;
    fn is_recording_participant(&self, device: &str) -> bool;
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("device name cannot be empty")]
    EmptyDeviceName,
    #[error("device {0} is configured more than once")]
    DuplicateDevice(String),
    #[error("device {0} has an invalid port")]
    InvalidPort(String),
}

/// Downstream consumer of the live data stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StreamTarget {
    pub host: String,
    #[serde(default = "default_stream_target_port")]
    pub port: u16,
}

impl StreamTarget {
    pub fn new(host: &str) -> StreamTarget {
        StreamTarget {
            host: host.to_string(),
            port: STREAM_TARGET_PORT,
        }
    }
}

/// Per-device settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceSettings {
    pub name: String,
    /// IP address of the phone running the capture app.
    pub address: IpAddr,
    #[serde(default = "default_device_port")]
    pub osc_port: u16,
    /// Whether the device records when a take starts.
    #[serde(default = "default_true")]
    pub recording: bool,
}

impl DeviceSettings {
    pub fn new(name: &str, address: IpAddr) -> DeviceSettings {
        DeviceSettings {
            name: name.to_string(),
            address,
            osc_port: DEFAULT_DEVICE_PORT,
            recording: true,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.osc_port)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Address of this machine, as seen by the devices.
    pub listen_address: IpAddr,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default)]
    pub stream_targets: Vec<StreamTarget>,
    #[serde(default)]
    pub devices: Vec<DeviceSettings>,
}

impl Settings {
    pub fn new(listen_address: IpAddr) -> Settings {
        Settings {
            listen_address,
            server_port: DEFAULT_SERVER_PORT,
            stream_targets: vec![],
            devices: vec![],
        }
    }

    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Settings::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Settings, ConfigError> {
        let settings: Settings = serde_yaml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for dev in &self.devices {
            if dev.name.trim().is_empty() {
                return Err(ConfigError::EmptyDeviceName);
            }
            if dev.osc_port == 0 {
                return Err(ConfigError::InvalidPort(dev.name.clone()));
            }
            if !seen.insert(dev.name.as_str()) {
                return Err(ConfigError::DuplicateDevice(dev.name.clone()));
            }
        }
        Ok(())
    }

    pub fn device(&self, name: &str) -> Option<&DeviceSettings> {
        self.devices.iter().find(|d| d.name == name)
    }
}

impl SessionConfig for Settings {
    fn stream_targets(&self) -> Vec<StreamTarget> {
        self.stream_targets.clone()
    }

    fn listen_address(&self) -> String {
        self.listen_address.to_string()
    }

    fn server_port(&self) -> u16 {
        self.server_port
    }

    fn is_recording_participant(&self, device: &str) -> bool {
        self.device(device).map(|d| d.recording).unwrap_or(false)
    }
}
