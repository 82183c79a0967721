//! Configuration loading and config file resolution
//!
//! Bootstrap configuration is read from a TOML file. Every key has a
//! compiled default, so a missing file or a partial file is never fatal.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. `<config_dir>/posw/scanner.toml` when it exists
//! 4. Compiled defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the scanner service config file
pub const CONFIG_ENV_VAR: &str = "POSW_SC_CONFIG";

/// Physical link to the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Usb,
    Bluetooth,
    Wifi,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Usb => write!(f, "usb"),
            TransportKind::Bluetooth => write!(f, "bluetooth"),
            TransportKind::Wifi => write!(f, "wifi"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "usb" => Ok(TransportKind::Usb),
            "bluetooth" => Ok(TransportKind::Bluetooth),
            "wifi" => Ok(TransportKind::Wifi),
            other => Err(Error::InvalidInput(format!("Unknown transport kind: {}", other))),
        }
    }
}

/// How scans are triggered once the session is scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// One read per explicit trigger
    Single,
    /// Timed polling loop at `scan_delay_ms`
    Continuous,
    /// Device pushes scans; reads are triggered explicitly
    Auto,
}

/// Code symbologies a scanner may be configured to emit
///
/// Informational only: classification does not depend on symbology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code128,
    Code39,
    Gs1_128,
    Qr,
    DataMatrix,
}

/// Scanner connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_transport_kind")]
    pub kind: TransportKind,

    /// Device identifier (serial port path, BT address, host:port)
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Serial baud rate, USB only
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            device_id: default_device_id(),
            baud_rate: default_baud_rate(),
        }
    }
}

/// Capture and classification parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanningConfig {
    #[serde(default = "default_scan_mode")]
    pub mode: ScanMode,

    /// Delay between polls in continuous mode
    #[serde(default = "default_scan_delay_ms")]
    pub scan_delay_ms: u64,

    /// Upper bound for a single transport read
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Shortest accepted code, in characters
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Longest accepted code, in characters
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Longest accepted QR payload, in characters
    #[serde(default = "default_qr_max_length")]
    pub qr_max_length: usize,

    /// Keystroke gap above which a buffer is treated as human typing
    #[serde(default = "default_inter_char_threshold_ms")]
    pub inter_char_threshold_ms: u64,

    #[serde(default = "default_symbologies")]
    pub enabled_symbologies: Vec<Symbology>,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            mode: default_scan_mode(),
            scan_delay_ms: default_scan_delay_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            min_length: default_min_length(),
            max_length: default_max_length(),
            qr_max_length: default_qr_max_length(),
            inter_char_threshold_ms: default_inter_char_threshold_ms(),
            enabled_symbologies: default_symbologies(),
        }
    }
}

impl ScanningConfig {
    pub fn scan_delay(&self) -> Duration {
        Duration::from_millis(self.scan_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn inter_char_threshold(&self) -> Duration {
        Duration::from_millis(self.inter_char_threshold_ms)
    }

    /// True when `len` lies within `[min_length, max_length]`
    pub fn accepts_length(&self, len: usize) -> bool {
        (self.min_length..=self.max_length).contains(&len)
    }

    /// Bound for QR payloads: `[min_length, qr_max_length]`
    pub fn accepts_qr_length(&self, len: usize) -> bool {
        (self.min_length..=self.qr_max_length).contains(&len)
    }
}

/// Audible confirmation cue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 0.0-1.0
    #[serde(default = "default_volume")]
    pub volume: f32,

    #[serde(default = "default_beep_duration_ms")]
    pub duration_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: default_volume(),
            duration_ms: default_beep_duration_ms(),
        }
    }
}

/// Complete scanner configuration record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub scanning: ScanningConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

impl ScannerConfig {
    /// Reject configurations no session can run with
    pub fn validate(&self) -> Result<()> {
        if self.connection.device_id.trim().is_empty() {
            return Err(Error::InvalidInput("device_id must not be empty".to_string()));
        }
        if self.connection.kind == TransportKind::Usb && self.connection.baud_rate == 0 {
            return Err(Error::InvalidInput("baud_rate must be positive for usb".to_string()));
        }
        let scanning = &self.scanning;
        if scanning.min_length == 0 {
            return Err(Error::InvalidInput("min_length must be at least 1".to_string()));
        }
        if scanning.min_length > scanning.max_length {
            return Err(Error::InvalidInput(format!(
                "min_length {} exceeds max_length {}",
                scanning.min_length, scanning.max_length
            )));
        }
        if scanning.qr_max_length < scanning.max_length {
            return Err(Error::InvalidInput(format!(
                "qr_max_length {} is below max_length {}",
                scanning.qr_max_length, scanning.max_length
            )));
        }
        if scanning.mode == ScanMode::Continuous && scanning.scan_delay_ms == 0 {
            return Err(Error::InvalidInput(
                "scan_delay_ms must be positive in continuous mode".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.feedback.volume) {
            return Err(Error::InvalidInput(format!(
                "feedback volume {} outside 0.0-1.0",
                self.feedback.volume
            )));
        }
        Ok(())
    }
}

/// HTTP server and resolver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the inventory service used for barcode lookup
    #[serde(default)]
    pub inventory_url: Option<String>,

    /// Inventory request timeout
    #[serde(default = "default_inventory_timeout_ms")]
    pub inventory_timeout_ms: u64,

    /// JSON product catalog used when no inventory service is configured
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            inventory_url: None,
            inventory_timeout_ms: default_inventory_timeout_ms(),
            catalog_path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to compiled defaults
    ///
    /// A missing file logs a warning; a file that exists but fails to parse
    /// is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                info!("No config file, using compiled defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Resolve the config file path following the priority order above
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_file().filter(|path| path.exists())
}

/// `<config_dir>/posw/scanner.toml` for the current platform
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("posw").join("scanner.toml"))
}

fn default_transport_kind() -> TransportKind {
    TransportKind::Usb
}

fn default_device_id() -> String {
    "keyboard-wedge".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_scan_mode() -> ScanMode {
    ScanMode::Auto
}

fn default_scan_delay_ms() -> u64 {
    500
}

fn default_read_timeout_ms() -> u64 {
    2000
}

fn default_min_length() -> usize {
    4
}

fn default_max_length() -> usize {
    50
}

fn default_qr_max_length() -> usize {
    2048
}

fn default_inter_char_threshold_ms() -> u64 {
    100
}

fn default_symbologies() -> Vec<Symbology> {
    vec![
        Symbology::Ean13,
        Symbology::Ean8,
        Symbology::UpcA,
        Symbology::Code128,
        Symbology::Gs1_128,
        Symbology::Qr,
    ]
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f32 {
    0.5
}

fn default_beep_duration_ms() -> u64 {
    100
}

fn default_port() -> u16 {
    5780
}

fn default_inventory_timeout_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}
