//! Driver adapters
//!
//! One driver per device platform family, behind a uniform contract:
//! `connect` opens a session, `retrieve_config` pulls the raw configuration
//! text, `close` tears the session down. Drivers never retry internally;
//! retry policy belongs to the retry machine so backoff semantics stay
//! uniform across vendors.

mod cisco;
mod juniper;
pub mod mock;
pub mod ssh;

pub use cisco::{CiscoAsaDriver, CiscoIosDriver};
pub use juniper::JunosDriver;

use crate::config::{Credential, DeviceDescriptor, Platform};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("no driver registered for platform '{0}'")]
    Unsupported(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),
}

impl DriverError {
    /// Connect and retrieval failures are transient and eligible for retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriverError::Connect(_) | DriverError::Retrieval(_))
    }
}

/// An open session with one device.
///
/// Teardown runs exactly once: either through the driver's `close`, or
/// through `Drop` when a timed-out or cancelled task abandons the session.
pub struct Session {
    device_id: String,
    transport: Option<ssh::SshTransport>,
    close_hook: Option<Box<dyn FnOnce() + Send>>,
}

impl Session {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            transport: None,
            close_hook: None,
        }
    }

    pub(crate) fn with_transport(mut self, transport: ssh::SshTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Register a hook that fires once when the session is torn down.
    /// Used by scripted test drivers to count close calls.
    pub fn with_close_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.close_hook = Some(Box::new(hook));
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub(crate) fn transport(&self) -> Option<&ssh::SshTransport> {
        self.transport.as_ref()
    }

    fn teardown(&mut self) {
        self.transport = None;
        if let Some(hook) = self.close_hook.take() {
            hook();
        }
    }

    /// Graceful close. Idempotent by construction; never fails.
    pub fn close(mut self) {
        debug!("Closing session for device '{}'", self.device_id);
        self.teardown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Per-platform connection and retrieval strategy.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Open a session with the device. Must not retry.
    async fn connect(
        &self,
        desc: &DeviceDescriptor,
        cred: &Credential,
    ) -> Result<Session, DriverError>;

    /// Pull the raw configuration text over an open session. Must not retry.
    async fn retrieve_config(&self, session: &mut Session) -> Result<String, DriverError>;

    /// Tear down a session. Always safe to call; swallows its own errors so
    /// cleanup never masks the primary result.
    async fn close(&self, session: Session) {
        session.close();
    }

    /// Driver name (for logging)
    fn name(&self) -> &'static str;
}

/// Registered-variant dispatch: platform tag to driver, resolved once per
/// run at descriptor-load time.
#[derive(Clone)]
pub struct DriverRegistry {
    drivers: HashMap<Platform, Arc<dyn DeviceDriver>>,
}

impl DriverRegistry {
    /// Registry with all built-in platform drivers.
    pub fn builtin() -> Self {
        Self {
            drivers: HashMap::from([
                (
                    Platform::CiscoIos,
                    Arc::new(CiscoIosDriver::new()) as Arc<dyn DeviceDriver>,
                ),
                (
                    Platform::CiscoAsa,
                    Arc::new(CiscoAsaDriver::new()) as Arc<dyn DeviceDriver>,
                ),
                (
                    Platform::Junos,
                    Arc::new(JunosDriver::new()) as Arc<dyn DeviceDriver>,
                ),
            ]),
        }
    }

    pub fn empty() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Register or replace the driver for a platform.
    pub fn with_driver(mut self, platform: Platform, driver: Arc<dyn DeviceDriver>) -> Self {
        self.drivers.insert(platform, driver);
        self
    }

    pub fn resolve(&self, platform: Platform) -> Result<Arc<dyn DeviceDriver>, DriverError> {
        self.drivers
            .get(&platform)
            .cloned()
            .ok_or_else(|| DriverError::Unsupported(platform.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_covers_every_platform() {
        let registry = DriverRegistry::builtin();
        for platform in [Platform::CiscoIos, Platform::CiscoAsa, Platform::Junos] {
            assert!(registry.resolve(platform).is_ok());
        }
    }

    #[test]
    fn empty_registry_reports_unsupported() {
        let registry = DriverRegistry::empty();
        let err = registry.resolve(Platform::Junos).err().unwrap();
        assert!(matches!(err, DriverError::Unsupported(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn session_close_hook_fires_exactly_once() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let closes = Arc::new(AtomicU32::new(0));

        let hook = {
            let closes = Arc::clone(&closes);
            move || {
                closes.fetch_add(1, Ordering::SeqCst);
            }
        };
        let session = Session::new("r1").with_close_hook(hook);
        session.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // Drop path fires too, once
        let closes2 = Arc::new(AtomicU32::new(0));
        {
            let closes2 = Arc::clone(&closes2);
            let _session = Session::new("r1").with_close_hook(move || {
                closes2.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(closes2.load(Ordering::SeqCst), 1);
    }
}
