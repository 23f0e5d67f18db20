//! Cisco IOS and ASA driver adapters

use super::ssh::SshTransport;
use super::{DeviceDriver, DriverError, Session};
use crate::config::{Credential, DeviceDescriptor};
use async_trait::async_trait;
use tracing::debug;

/// Cisco IOS / IOS-XE devices.
#[derive(Debug, Default)]
pub struct CiscoIosDriver;

/// Cisco ASA firewalls. Same session handling as IOS, different command to
/// read the full running config.
#[derive(Debug, Default)]
pub struct CiscoAsaDriver;

impl CiscoIosDriver {
    pub fn new() -> Self {
        Self
    }
}

impl CiscoAsaDriver {
    pub fn new() -> Self {
        Self
    }
}

async fn cisco_connect(
    desc: &DeviceDescriptor,
    cred: &Credential,
) -> Result<Session, DriverError> {
    let transport = SshTransport::new(desc, cred);
    transport
        .probe()
        .await
        .map_err(|e| DriverError::Connect(e.to_string()))?;
    debug!("Connected to {} ({})", desc.id, desc.address);
    Ok(Session::new(&desc.id).with_transport(transport))
}

async fn cisco_retrieve(session: &mut Session, show_command: &str) -> Result<String, DriverError> {
    let transport = session
        .transport()
        .ok_or_else(|| DriverError::Retrieval("session has no open transport".to_string()))?;

    let output = transport
        .exec(show_command, None)
        .await
        .map_err(|e| DriverError::Retrieval(e.to_string()))?;

    if output.trim().is_empty() {
        return Err(DriverError::Retrieval(format!(
            "device returned an empty configuration for '{}'",
            show_command
        )));
    }

    Ok(output)
}

#[async_trait]
impl DeviceDriver for CiscoIosDriver {
    async fn connect(
        &self,
        desc: &DeviceDescriptor,
        cred: &Credential,
    ) -> Result<Session, DriverError> {
        cisco_connect(desc, cred).await
    }

    async fn retrieve_config(&self, session: &mut Session) -> Result<String, DriverError> {
        cisco_retrieve(session, "show running-config").await
    }

    fn name(&self) -> &'static str {
        "cisco_ios"
    }
}

#[async_trait]
impl DeviceDriver for CiscoAsaDriver {
    async fn connect(
        &self,
        desc: &DeviceDescriptor,
        cred: &Credential,
    ) -> Result<Session, DriverError> {
        cisco_connect(desc, cred).await
    }

    async fn retrieve_config(&self, session: &mut Session) -> Result<String, DriverError> {
        cisco_retrieve(session, "more system:running-config").await
    }

    fn name(&self) -> &'static str {
        "cisco_asa"
    }
}
