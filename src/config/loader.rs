use super::types::*;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Device '{device}' uses unsupported platform tag '{platform}'")]
    UnsupportedPlatform { device: String, platform: String },

    #[error("Credential reference '{0}' not found")]
    CredentialNotFound(String),

    #[error("Environment variable '{var}' for credential '{name}' is not set")]
    CredentialEnvMissing { name: String, var: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.devices.is_empty() {
        return Err(ConfigError::ValidationError(
            "No devices defined in inventory".to_string(),
        ));
    }

    if config.global.workers == 0 {
        return Err(ConfigError::ValidationError(
            "global.workers must be at least 1".to_string(),
        ));
    }

    if config.global.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "global.max_attempts must be at least 1".to_string(),
        ));
    }

    for (id, device) in &config.devices {
        // Unknown platform tags fail here, long before any connection attempt
        if Platform::from_tag(&device.platform).is_none() {
            return Err(ConfigError::UnsupportedPlatform {
                device: id.clone(),
                platform: device.platform.clone(),
            });
        }

        if !config.credentials.contains_key(&device.credentials) {
            return Err(ConfigError::CredentialNotFound(device.credentials.clone()));
        }

        if device.address.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Device '{}' has an empty address",
                id
            )));
        }
    }

    Ok(())
}

/// Resolve the inventory into device descriptors, sorted by id.
///
/// Platform tags were already validated by `load_config`; this also guards
/// descriptors built by hand.
pub fn resolve_devices(config: &Config) -> Result<Vec<DeviceDescriptor>> {
    let mut devices = Vec::with_capacity(config.devices.len());

    for (id, device) in &config.devices {
        let platform = Platform::from_tag(&device.platform).ok_or_else(|| {
            ConfigError::UnsupportedPlatform {
                device: id.clone(),
                platform: device.platform.clone(),
            }
        })?;

        devices.push(DeviceDescriptor {
            id: id.clone(),
            address: device.address.clone(),
            port: device.port,
            platform,
            credential_ref: device.credentials.clone(),
            groups: device.groups.clone(),
            enabled: device.enabled,
        });
    }

    devices.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(devices)
}

/// Narrow a device list down to explicit ids and/or group tags.
/// Empty filters select everything; an unknown explicit id is an error.
pub fn select_devices(
    devices: &[DeviceDescriptor],
    ids: &[String],
    groups: &[String],
) -> Result<Vec<DeviceDescriptor>> {
    for id in ids {
        if !devices.iter().any(|d| &d.id == id) {
            return Err(ConfigError::ValidationError(format!(
                "Device '{}' not found in inventory",
                id
            )));
        }
    }

    if ids.is_empty() && groups.is_empty() {
        return Ok(devices.to_vec());
    }

    Ok(devices
        .iter()
        .filter(|d| {
            ids.contains(&d.id) || d.groups.iter().any(|g| groups.contains(g))
        })
        .cloned()
        .collect())
}
