use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub credentials: HashMap<String, CredentialConfig>,
    pub devices: HashMap<String, DeviceConfig>,
}

/// Global configuration settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Root of the git working tree that receives snapshots
    pub backup_dir: PathBuf,

    /// Concurrency and retry settings
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: u64,
    #[serde(default = "default_device_timeout")]
    pub device_timeout_seconds: u64,

    /// Logging configuration
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,
}

/// A named credential entry. The secret itself never lives in the config
/// file; `password_env` names the environment variable that carries it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialConfig {
    pub username: String,
    #[serde(default)]
    pub password_env: Option<String>,
}

/// Per-device inventory entry (raw, before platform resolution)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub address: String,

    /// Platform tag, e.g. "cisco_ios", "cisco_asa", "junos"
    pub platform: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Reference into the `[credentials]` table
    pub credentials: String,

    #[serde(default)]
    pub groups: Vec<String>,

    /// Disabled devices still appear in the run report, as Skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Supported device platform families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    CiscoIos,
    CiscoAsa,
    Junos,
}

impl Platform {
    /// Parse a platform tag as it appears in the inventory.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "cisco_ios" => Some(Platform::CiscoIos),
            "cisco_asa" => Some(Platform::CiscoAsa),
            "junos" => Some(Platform::Junos),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::CiscoIos => "cisco_ios",
            Platform::CiscoAsa => "cisco_asa",
            Platform::Junos => "junos",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved device descriptor (after platform and credential validation).
/// Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub platform: Platform,
    pub credential_ref: String,
    pub groups: Vec<String>,
    pub enabled: bool,
}

// Default value functions

fn default_workers() -> usize {
    8
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    2
}
fn default_max_delay() -> u64 {
    30
}
fn default_device_timeout() -> u64 {
    120
}
fn default_log_directory() -> PathBuf {
    PathBuf::from("~/logs")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_max_files() -> u32 {
    10
}
fn default_port() -> u16 {
    22
}
fn default_enabled() -> bool {
    true
}
