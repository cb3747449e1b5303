//! Configuration management for Hotmirror.
//!
//! This module handles loading, saving, and validating the preview client's
//! configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/hotmirror/config.toml` |
//! | macOS | `~/Library/Application Support/dev.hotmirror.Hotmirror/config.toml` |
//! | Windows | `%APPDATA%\Hotmirror\Hotmirror\config\config.toml` |
//!
//! The sandbox that mirrored projects are written to defaults to the
//! platform data directory (`~/.local/share/hotmirror/sandbox` on Linux).
//!
//! ## Example
//!
//! ```rust,ignore
//! use hotmirror_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Sandbox: {}", config.sandbox_root().display());
//! ```

use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::frame::FrameVersion;

/// Main configuration struct for Hotmirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Network settings
    pub network: NetworkConfig,
    /// Import settings
    pub import: ImportConfig,
    /// Discovery settings
    pub discovery: DiscoveryConfig,
}

/// General configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Identity announced when this machine broadcasts beacons
    pub host_id: String,
    /// Directory mirrored projects are written under (platform default if unset)
    pub sandbox_root: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            host_id: hostname::get().map_or_else(
                |_| {
                    let suffix = uuid::Uuid::new_v4().simple().to_string();
                    format!("hotmirror-{}", &suffix[..8])
                },
                |h| h.to_string_lossy().to_string(),
            ),
            sandbox_root: None,
        }
    }
}

/// Network configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Discovery port (UDP)
    pub discovery_port: u16,
    /// IPv4 multicast group beacons are sent to
    pub ipv4_group: Ipv4Addr,
    /// IPv6 multicast group beacons are sent to
    pub ipv6_group: Ipv6Addr,
    /// Port hosts accept WebSocket clients on
    pub client_port: u16,
    /// Listen on the IPv6 group as well
    pub ipv6: bool,
    /// Prefix identifying a host beacon
    pub beacon_marker: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: crate::DEFAULT_DISCOVERY_PORT,
            ipv4_group: crate::DEFAULT_IPV4_GROUP,
            ipv6_group: crate::DEFAULT_IPV6_GROUP,
            client_port: crate::DEFAULT_CLIENT_PORT,
            ipv6: true,
            beacon_marker: crate::BEACON_MARKER.to_string(),
        }
    }
}

/// Import configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Bulk frame layout spoken by the host
    pub frame_version: FrameVersion,
    /// Largest payload a bulk frame may declare
    pub max_payload_size: usize,
    /// Control messages held while an import runs
    pub control_queue_capacity: usize,
    /// Bulk frames held while an import runs (0 drops them)
    pub bulk_queue_capacity: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            frame_version: FrameVersion::default(),
            max_payload_size: crate::DEFAULT_MAX_PAYLOAD_SIZE,
            control_queue_capacity: crate::DEFAULT_CONTROL_QUEUE_CAPACITY,
            bulk_queue_capacity: 0,
        }
    }
}

/// Discovery configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How often `announce` sends a beacon
    #[serde(with = "humantime_serde")]
    pub beacon_interval: Duration,
    /// How long `scan` and address-less `connect` listen
    #[serde(with = "humantime_serde")]
    pub scan_duration: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            beacon_interval: Duration::from_secs(1),
            scan_duration: Duration::from_secs(3),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Render as the TOML written to disk.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.network.discovery_port == 0 {
            return Err(Error::InvalidConfig {
                key: "network.discovery_port".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.network.client_port == 0 {
            return Err(Error::InvalidConfig {
                key: "network.client_port".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if !self.network.ipv4_group.is_multicast() {
            return Err(Error::InvalidConfig {
                key: "network.ipv4_group".to_string(),
                reason: format!("{} is not a multicast address", self.network.ipv4_group),
            });
        }
        if !self.network.ipv6_group.is_multicast() {
            return Err(Error::InvalidConfig {
                key: "network.ipv6_group".to_string(),
                reason: format!("{} is not a multicast address", self.network.ipv6_group),
            });
        }
        if self.network.beacon_marker.is_empty() {
            return Err(Error::InvalidConfig {
                key: "network.beacon_marker".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.import.max_payload_size == 0 || self.import.max_payload_size > i32::MAX as usize
        {
            return Err(Error::InvalidConfig {
                key: "import.max_payload_size".to_string(),
                reason: format!("must be between 1 and {}", i32::MAX),
            });
        }
        if self.import.control_queue_capacity == 0 {
            return Err(Error::InvalidConfig {
                key: "import.control_queue_capacity".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Directory mirrored projects live under.
    #[must_use]
    pub fn sandbox_root(&self) -> PathBuf {
        self.general.sandbox_root.clone().unwrap_or_else(|| {
            Self::data_dir()
                .unwrap_or_else(|| PathBuf::from(".hotmirror"))
                .join("sandbox")
        })
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "hotmirror", "Hotmirror")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "hotmirror", "Hotmirror")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let (digits, scale) = if let Some(ms) = s.strip_suffix("ms") {
            (ms, 1)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1000)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60_000)
        } else {
            return Err(serde::de::Error::custom("invalid duration format"));
        };

        let n = digits
            .trim()
            .parse::<u64>()
            .map_err(serde::de::Error::custom)?;
        n.checked_mul(scale)
            .map(Duration::from_millis)
            .ok_or_else(|| serde::de::Error::custom(format!("duration '{s}' is too large")))
    }
}
