//! Credential resolution
//!
//! Config entries only carry a username and the name of an environment
//! variable; the secret itself is resolved at run start and wrapped in
//! `SecretString` so it can never end up in a log line or report.

use super::loader::{ConfigError, Result};
use super::types::Config;
use secrecy::SecretString;
use std::collections::HashMap;
use std::fmt;

/// Resolved secret material handed to a driver's `connect`.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub password: Option<SecretString>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Resolve one credential reference.
pub fn resolve_credential(config: &Config, reference: &str) -> Result<Credential> {
    let entry = config
        .credentials
        .get(reference)
        .ok_or_else(|| ConfigError::CredentialNotFound(reference.to_string()))?;

    let password = match &entry.password_env {
        Some(var) => match std::env::var(var) {
            Ok(value) => Some(SecretString::new(value)),
            Err(_) => {
                return Err(ConfigError::CredentialEnvMissing {
                    name: reference.to_string(),
                    var: var.clone(),
                })
            }
        },
        None => None,
    };

    Ok(Credential {
        username: entry.username.clone(),
        password,
    })
}

/// Resolve every credential referenced by the inventory up front, so a
/// missing environment variable aborts the run before any dispatch.
pub fn resolve_all_credentials(config: &Config) -> Result<HashMap<String, Credential>> {
    let mut resolved = HashMap::new();

    for device in config.devices.values() {
        if !resolved.contains_key(&device.credentials) {
            let credential = resolve_credential(config, &device.credentials)?;
            resolved.insert(device.credentials.clone(), credential);
        }
    }

    Ok(resolved)
}
