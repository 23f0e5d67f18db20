//! Configuration and inventory for netstash
//!
//! The config file is TOML with three sections: `[global]` run settings,
//! `[credentials.*]` named credential references, and `[devices.*]` the
//! device inventory. Platform tags and credential references are validated
//! at load time so a bad inventory aborts the run before anything connects.

mod credentials;
mod loader;
mod types;

pub use credentials::{resolve_all_credentials, resolve_credential, Credential};
pub use loader::{load_config, resolve_devices, select_devices, ConfigError, Result};
pub use types::*;
