//! Juniper Junos driver adapter

use super::ssh::SshTransport;
use super::{DeviceDriver, DriverError, Session};
use crate::config::{Credential, DeviceDescriptor};
use async_trait::async_trait;
use tracing::debug;

/// Juniper devices running Junos. Configuration is pulled in `display set`
/// form, which diffs line-by-line much better than the braced format.
#[derive(Debug, Default)]
pub struct JunosDriver;

impl JunosDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceDriver for JunosDriver {
    async fn connect(
        &self,
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

    async fn retrieve_config(&self, session: &mut Session) -> Result<String, DriverError> {
        let transport = session
            .transport()
            .ok_or_else(|| DriverError::Retrieval("session has no open transport".to_string()))?;

        let output = transport
            .exec("show configuration | display set | no-more", None)
            .await
            .map_err(|e| DriverError::Retrieval(e.to_string()))?;

        if output.trim().is_empty() {
            return Err(DriverError::Retrieval(
                "device returned an empty configuration".to_string(),
            ));
        }

        Ok(output)
    }

    fn name(&self) -> &'static str {
        "junos"
    }
}
