//! Configuration structures for the gateway.
//!
//! Supports TOML deserialization with sensible defaults for a bench setup
//! and explicit values for a deployed machine.

use crate::error::{HmiError, HmiResult};
use crate::io_map::{self, IoMap, IoMapEntry};
use crate::program::Side;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Local HTTP interface.
    pub http: HttpConfig,

    /// Controller address.
    pub target: TargetConfig,

    /// Controller symbol names.
    pub tags: TagConfig,

    /// Live state polling.
    pub poller: PollerConfig,

    /// Pulse writes.
    pub pulse: PulseConfig,

    /// Recipe file storage.
    pub recipes: RecipeConfig,

    /// Simulated controller used when no vendor client is linked.
    pub simulator: SimulatorConfig,

    /// Indexed I/O table. Empty means the built-in table.
    pub io_map: Vec<IoMapEntry>,
}

/// HTTP interface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
    /// Enable permissive CORS for the panel UI.
    pub enable_cors: bool,
    /// WebSocket broadcast channel capacity.
    pub ws_channel_capacity: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            enable_cors: true,
            ws_channel_capacity: 64,
        }
    }
}

/// Controller address configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// AMS Net ID, dotted integers.
    pub ams_net_id: String,
    /// Host running the ADS router. Defaults to the first four octets of
    /// the Net ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Runtime port on the controller.
    pub port: u16,
    /// Upper bound on a single connect attempt.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            ams_net_id: String::from("5.84.112.90.1.1"),
            host: None,
            port: 851,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Symbol names for one head.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SideTags {
    /// Prefix of the per-step program array, e.g. `GVL_Program.aLeftSteps`.
    pub program_prefix: String,
    /// Axis 1 actual position.
    pub axis1_position: String,
    /// Axis 2 actual position.
    pub axis2_position: String,
    /// Active step number.
    pub step_number: String,
    /// Active step description.
    pub step_description: String,
    /// Run-mode feedback.
    pub run_mode: String,
    /// Jog-mode feedback.
    pub jog_mode: String,
}

impl SideTags {
    fn for_side(side: &str) -> Self {
        Self {
            program_prefix: format!("GVL_Program.a{side}Steps"),
            axis1_position: format!("GVL_Axis.f{side}Axis1ActPos"),
            axis2_position: format!("GVL_Axis.f{side}Axis2ActPos"),
            step_number: format!("GVL_HMI.n{side}Step"),
            step_description: format!("GVL_HMI.s{side}StepText"),
            run_mode: format!("GVL_HMI.b{side}RunMode"),
            jog_mode: format!("GVL_HMI.b{side}JogMode"),
        }
    }
}

impl Default for SideTags {
    fn default() -> Self {
        Self::for_side("Left")
    }
}

/// Controller symbol names used by the gateway and poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Target of `POST /write`.
    pub default_write_tag: String,
    /// Heartbeat spellings tried in order.
    pub heartbeat_candidates: Vec<String>,
    /// Production counter.
    pub production_count: String,
    /// Alarm bitfield (UDINT).
    pub alarm_word: String,
    /// Machine-status bitfield (UDINT).
    pub status_word: String,
    /// Left head symbols.
    pub left: SideTags,
    /// Right head symbols.
    pub right: SideTags,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            default_write_tag: String::from("GVL_HMI.nCommand"),
            heartbeat_candidates: vec![
                String::from("MAIN.nHeartbeat"),
                String::from("GVL.nHeartbeat"),
                String::from("GVL_HMI.nHeartbeat"),
                String::from("MAIN.Heartbeat"),
                String::from("MAIN.heartbeat"),
            ],
            production_count: String::from("GVL_HMI.nPartCount"),
            alarm_word: String::from("GVL_HMI.dwAlarms"),
            status_word: String::from("GVL_HMI.dwStatus"),
            left: SideTags::for_side("Left"),
            right: SideTags::for_side("Right"),
        }
    }
}

impl TagConfig {
    /// Symbols for one head.
    #[must_use]
    pub fn side(&self, side: Side) -> &SideTags {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// Live state polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Run the poller.
    pub enabled: bool,
    /// Tick period.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(500),
        }
    }
}

/// Pulse write configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// High time when the request does not specify one.
    #[serde(with = "humantime_serde")]
    pub default_duration: Duration,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            default_duration: Duration::from_millis(150),
        }
    }
}

/// Recipe storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeConfig {
    /// Directory holding one JSON file per recipe.
    pub dir: PathBuf,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("recipes"),
        }
    }
}

/// Simulated controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Serve from the in-memory controller instead of a real one.
    pub enabled: bool,
    /// Pre-create every symbol the gateway, poller, and translator use.
    pub seed_machine_tags: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seed_machine_tags: true,
        }
    }
}

/// Check that an address is a dot-separated sequence of integers.
///
/// Range is not checked: `999.1.2.3` is accepted.
///
/// # Errors
///
/// Returns a validation error for empty segments or non-digit characters.
pub fn validate_net_id(net_id: &str) -> HmiResult<()> {
    let well_formed = !net_id.is_empty()
        && net_id
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    if well_formed {
        Ok(())
    } else {
        Err(HmiError::Validation(format!(
            "invalid AMS Net ID '{net_id}': expected dot-separated integers"
        )))
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a malformed net id or a
    /// duplicated I/O index.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_net_id(&self.target.ams_net_id)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.io_map()
            .map(|_| ())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Build the I/O table, falling back to the built-in one.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for duplicate indexes.
    pub fn io_map(&self) -> HmiResult<IoMap> {
        if self.io_map.is_empty() {
            IoMap::from_entries(io_map::default_entries())
        } else {
            IoMap::from_entries(self.io_map.clone())
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Semantically invalid configuration.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
