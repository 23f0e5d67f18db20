//! Connection retry state machine
//!
//! Drives one device's backup attempt through an explicit finite-state
//! machine: Idle -> Connecting -> Retrieving -> Succeeded | Failed.
//! A retrieval failure goes back to Connecting with a fresh session. Backoff
//! between attempts grows exponentially up to a cap so an unreachable device
//! is not hammered.

use crate::config::{Credential, DeviceDescriptor};
use crate::drivers::{DeviceDriver, DriverError, Session};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Run-level retry configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before re-entering Connecting after failed attempt `attempt`
    /// (1-based): base * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// States of one device backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    Idle,
    Connecting,
    Retrieving,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Connected and retrieved
    Retrieved,
    ConnectFailed,
    RetrievalFailed,
}

/// Diagnostic record for one connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub device_id: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
}

/// Output of the retry loop for one device.
pub struct RetryOutcome {
    pub result: Result<String, DriverError>,
    pub attempts: Vec<ConnectionAttempt>,
}

impl RetryOutcome {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Drive the state machine for one device until a terminal state.
///
/// Exactly one `ConnectionAttempt` is logged per attempt; the driver is
/// never asked to retry internally.
pub async fn run_with_retries(
    driver: Arc<dyn DeviceDriver>,
    desc: &DeviceDescriptor,
    cred: &Credential,
    policy: &RetryPolicy,
) -> RetryOutcome {
    let mut state = BackupState::Idle;
    let mut attempts: Vec<ConnectionAttempt> = Vec::new();
    let mut attempt: u32 = 0;
    let mut started_at = Utc::now();
    let mut session: Option<Session> = None;
    let mut last_error: Option<DriverError> = None;
    let mut config_text: Option<String> = None;

    loop {
        match state {
            BackupState::Idle => {
                state = BackupState::Connecting;
            }

            BackupState::Connecting => {
                attempt += 1;
                started_at = Utc::now();
                debug!(
                    "Device '{}': attempt {}/{} connecting",
                    desc.id, attempt, policy.max_attempts
                );

                match driver.connect(desc, cred).await {
                    Ok(s) => {
                        session = Some(s);
                        state = BackupState::Retrieving;
                    }
                    Err(e) => {
                        warn!("Device '{}': connect failed: {}", desc.id, e);
                        attempts.push(ConnectionAttempt {
                            device_id: desc.id.clone(),
                            attempt,
                            started_at,
                            outcome: AttemptOutcome::ConnectFailed,
                            error: Some(e.to_string()),
                        });
                        last_error = Some(e);

                        if attempt >= policy.max_attempts {
                            state = BackupState::Failed;
                        } else {
                            tokio::time::sleep(policy.backoff(attempt)).await;
                            state = BackupState::Connecting;
                        }
                    }
                }
            }

            BackupState::Retrieving => {
                let mut open = session.take().expect("Retrieving entered without session");
                match driver.retrieve_config(&mut open).await {
                    Ok(text) => {
                        attempts.push(ConnectionAttempt {
                            device_id: desc.id.clone(),
                            attempt,
                            started_at,
                            outcome: AttemptOutcome::Retrieved,
                            error: None,
                        });
                        driver.close(open).await;
                        config_text = Some(text);
                        state = BackupState::Succeeded;
                    }
                    Err(e) => {
                        warn!("Device '{}': retrieval failed: {}", desc.id, e);
                        attempts.push(ConnectionAttempt {
                            device_id: desc.id.clone(),
                            attempt,
                            started_at,
                            outcome: AttemptOutcome::RetrievalFailed,
                            error: Some(e.to_string()),
                        });
                        driver.close(open).await;
                        last_error = Some(e);

                        if attempt >= policy.max_attempts {
                            state = BackupState::Failed;
                        } else {
                            // Fresh session on the next attempt
                            tokio::time::sleep(policy.backoff(attempt)).await;
                            state = BackupState::Connecting;
                        }
                    }
                }
            }

            BackupState::Succeeded => {
                return RetryOutcome {
                    result: Ok(config_text.expect("Succeeded without config text")),
                    attempts,
                };
            }

            BackupState::Failed => {
                let error = last_error
                    .take()
                    .unwrap_or_else(|| DriverError::Connect("unknown failure".to_string()));
                return RetryOutcome {
                    result: Err(error),
                    attempts,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Platform;
    use crate::drivers::mock::{ScriptedDriver, Step};

    fn descriptor(id: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            id: id.to_string(),
            address: "192.0.2.1".to_string(),
            port: 22,
            platform: Platform::CiscoIos,
            credential_ref: "lab".to_string(),
            groups: vec![],
            enabled: true,
        }
    }

    fn credential() -> Credential {
        Credential {
            username: "backup".to_string(),
            password: None,
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn backoff_is_monotonic_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(16));
        assert_eq!(policy.backoff(5), Duration::from_secs(30));
        assert_eq!(policy.backoff(12), Duration::from_secs(30));
        for a in 1..12 {
            assert!(policy.backoff(a) <= policy.backoff(a + 1));
        }
    }

    #[tokio::test]
    async fn connect_failures_consume_exactly_max_attempts() {
        let driver = ScriptedDriver::always_connect_fail("no route to host");
        let outcome = run_with_retries(
            driver.clone(),
            &descriptor("r1"),
            &credential(),
            &fast_policy(3),
        )
        .await;

        assert!(matches!(outcome.result, Err(DriverError::Connect(_))));
        assert_eq!(outcome.attempt_count(), 3);
        assert_eq!(driver.connect_count(), 3);
        assert!(outcome
            .attempts
            .iter()
            .all(|a| a.outcome == AttemptOutcome::ConnectFailed));
    }

    #[tokio::test]
    async fn retrieval_failure_retries_with_fresh_session() {
        let driver = ScriptedDriver::with_script(vec![
            Step::RetrieveFail("channel closed".to_string()),
            Step::Ok("hostname r1\n".to_string()),
        ]);
        let outcome = run_with_retries(
            driver.clone(),
            &descriptor("r1"),
            &credential(),
            &fast_policy(3),
        )
        .await;

        assert_eq!(outcome.attempt_count(), 2);
        assert_eq!(driver.connect_count(), 2);
        // One session per attempt, each closed exactly once
        assert_eq!(driver.close_count(), 2);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::RetrievalFailed);
        assert_eq!(outcome.attempts[1].outcome, AttemptOutcome::Retrieved);
        assert_eq!(outcome.result.unwrap(), "hostname r1\n");
    }

    #[tokio::test]
    async fn fail_twice_then_succeed_logs_three_attempts() {
        let driver = ScriptedDriver::with_script(vec![
            Step::ConnectFail("timeout".to_string()),
            Step::ConnectFail("timeout".to_string()),
            Step::Ok("hostname r2\n".to_string()),
        ]);
        let outcome = run_with_retries(
            driver.clone(),
            &descriptor("r2"),
            &credential(),
            &fast_policy(3),
        )
        .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempt_count(), 3);
    }

    #[tokio::test]
    async fn success_on_first_attempt_logs_one_attempt() {
        let driver = ScriptedDriver::always_ok("hostname r1\n");
        let outcome = run_with_retries(
            driver.clone(),
            &descriptor("r1"),
            &credential(),
            &fast_policy(3),
        )
        .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempt_count(), 1);
        assert_eq!(driver.close_count(), 1);
    }
}
