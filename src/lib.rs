//! Netstash library
//!
//! Versioned configuration backup for network devices: bounded concurrent
//! retrieval over ssh, per-platform driver adapters, and one git commit per
//! backup run.

pub mod config;
pub mod drivers;
pub mod managers;
pub mod normalize;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, resolve_devices, Config, DeviceDescriptor, Platform};
pub use drivers::{DeviceDriver, DriverRegistry, Session};
pub use managers::dispatch::CancelSource;
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::report::{BackupResult, BackupStatus, RunReport};
pub use managers::run::{RunCoordinator, RunSettings};
pub use store::GitStore;
