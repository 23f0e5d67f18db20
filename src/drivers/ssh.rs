//! Shared ssh shell-out transport
//!
//! All built-in drivers talk to devices through the system `ssh` binary in
//! batch mode, the same way the rest of the crate talks to `git`. Key-based
//! auth is the default; when a credential carries a password the invocation
//! is wrapped with `sshpass -e`, which reads the secret from the `SSHPASS`
//! environment variable so it never appears on a command line.

use crate::config::{Credential, DeviceDescriptor};
use crate::utils::command;
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::debug;

/// Timeout for the initial reachability/auth probe. Retrieval itself is
/// bounded by the dispatcher's per-device timeout.
const CONNECT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Parameters for one ssh session, built by `connect`.
#[derive(Debug, Clone)]
pub struct SshTransport {
    target: String,
    port: u16,
    envs: Vec<(String, String)>,
    use_sshpass: bool,
}

impl SshTransport {
    pub fn new(desc: &DeviceDescriptor, cred: &Credential) -> Self {
        let mut envs = Vec::new();
        let use_sshpass = match &cred.password {
            Some(password) => {
                envs.push(("SSHPASS".to_string(), password.expose_secret().clone()));
                true
            }
            None => false,
        };

        Self {
            target: format!("{}@{}", cred.username, desc.address),
            port: desc.port,
            envs,
            use_sshpass,
        }
    }

    fn invocation<'a>(&'a self, remote_command: &'a str, port: &'a str) -> (&'a str, Vec<&'a str>) {
        let ssh_args = [
            "-o",
            "BatchMode=yes",
            "-o",
            "StrictHostKeyChecking=accept-new",
            "-p",
            port,
            self.target.as_str(),
            remote_command,
        ];

        if self.use_sshpass {
            // sshpass needs BatchMode off so ssh actually prompts
            let mut args = vec!["-e", "ssh"];
            args.extend([
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-p",
                port,
                self.target.as_str(),
                remote_command,
            ]);
            ("sshpass", args)
        } else {
            ("ssh", ssh_args.to_vec())
        }
    }

    /// Execute one remote command and return its stdout.
    pub async fn exec(
        &self,
        remote_command: &str,
        timeout: Option<Duration>,
    ) -> anyhow::Result<String> {
        let port = self.port.to_string();
        let (program, args) = self.invocation(remote_command, &port);
        debug!("ssh exec on {}: {}", self.target, remote_command);
        command::run_command_stdout(program, &args, &self.envs, None, timeout).await
    }

    /// Cheap reachability and auth check used by `connect`.
    pub async fn probe(&self) -> anyhow::Result<()> {
        self.exec("exit", Some(CONNECT_PROBE_TIMEOUT)).await?;
        Ok(())
    }
}
