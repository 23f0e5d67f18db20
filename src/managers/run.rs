//! Run coordinator
//!
//! Top-level state machine over one backup run:
//! Starting -> Dispatching -> Committing -> Done.
//!
//! Anything that fails before Dispatching (bad inventory, missing secret,
//! unusable repository) aborts the whole run with no commit. Once
//! Dispatching begins, failures are per-device and isolated; the single
//! commit happens only after every device has a terminal result.

use crate::config::{self, Config, Credential, DeviceDescriptor};
use crate::drivers::DriverRegistry;
use crate::managers::dispatch::{self, CancelToken, DispatchLimits};
use crate::managers::report::{BackupResult, RunReport};
use crate::managers::retry::{self, RetryPolicy};
use crate::normalize;
use crate::store::{GitStore, Snapshot};
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Everything the coordinator needs besides the inventory.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub backup_dir: PathBuf,
    pub limits: DispatchLimits,
    pub retry: RetryPolicy,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            backup_dir: config.global.backup_dir.clone(),
            limits: DispatchLimits {
                workers: config.global.workers,
                device_timeout: std::time::Duration::from_secs(
                    config.global.device_timeout_seconds,
                ),
            },
            retry: RetryPolicy {
                max_attempts: config.global.max_attempts,
                base_delay: std::time::Duration::from_secs(config.global.base_delay_seconds),
                max_delay: std::time::Duration::from_secs(config.global.max_delay_seconds),
            },
        }
    }
}

/// Phases of a run, in order. Used for logging and to decide whether a
/// failure aborts everything or only one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Starting,
    Dispatching,
    Committing,
    Done,
}

pub struct RunCoordinator {
    settings: RunSettings,
    devices: Vec<DeviceDescriptor>,
    credentials: HashMap<String, Credential>,
    registry: DriverRegistry,
}

impl RunCoordinator {
    /// Build a coordinator with explicit parts (used by tests and embedders).
    pub fn new(
        settings: RunSettings,
        devices: Vec<DeviceDescriptor>,
        credentials: HashMap<String, Credential>,
        registry: DriverRegistry,
    ) -> Self {
        Self {
            settings,
            devices,
            credentials,
            registry,
        }
    }

    /// Build from a validated config: resolves descriptors and all
    /// credentials up front, so a missing secret aborts before dispatch.
    pub fn from_config(config: &Config, registry: DriverRegistry) -> Result<Self> {
        let devices = config::resolve_devices(config).context("Failed to resolve inventory")?;
        let credentials = config::resolve_all_credentials(config)
            .context("Failed to resolve credentials")?;
        Ok(Self::new(
            RunSettings::from_config(config),
            devices,
            credentials,
            registry,
        ))
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Execute one backup pass over the selected devices and return the
    /// finalized report.
    pub async fn run(&self, cancel: CancelToken) -> Result<RunReport> {
        let mut phase = RunPhase::Starting;
        let started_at = Utc::now();
        let run_id = started_at.format("%Y%m%dT%H%M%SZ").to_string();

        info!(
            "Run {}: phase {:?}, {} device(s), {} worker(s)",
            run_id,
            phase,
            self.devices.len(),
            self.settings.limits.workers
        );

        // Repository problems abort here, before any device is touched
        let store = Arc::new(
            GitStore::open_or_init(&self.settings.backup_dir)
                .await
                .context("Failed to open snapshot repository")?,
        );

        phase = RunPhase::Dispatching;
        info!("Run {}: phase {:?}", run_id, phase);
        let task = self.make_device_task(Arc::clone(&store));
        let results = dispatch::dispatch(
            self.devices.clone(),
            self.settings.limits,
            cancel,
            task,
        )
        .await;

        debug_assert_eq!(results.len(), self.devices.len());

        phase = RunPhase::Committing;
        let report = RunReport::new(run_id, started_at, results);
        info!(
            "Run {}: phase {:?}, {}",
            report.run_id,
            phase,
            report.summary_line()
        );

        let changed = store
            .commit_run(&report)
            .await
            .context("Failed to commit backup run")?;
        if !changed.is_empty() {
            info!(
                "Run {}: committed {} changed snapshot(s)",
                report.run_id,
                changed.len()
            );
        }

        phase = RunPhase::Done;
        info!("Run {}: phase {:?}", report.run_id, phase);
        Ok(report)
    }

    /// The per-device task handed to the dispatcher. Every error is caught
    /// here and turned into this device's Failed result.
    fn make_device_task(
        &self,
        store: Arc<GitStore>,
    ) -> impl Fn(DeviceDescriptor) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = BackupResult> + Send>,
    > + Send
           + Sync
           + 'static {
        let registry = self.registry.clone();
        let credentials = Arc::new(self.credentials.clone());
        let retry_policy = self.settings.retry;

        move |desc: DeviceDescriptor| {
            let registry = registry.clone();
            let credentials = Arc::clone(&credentials);
            let store = Arc::clone(&store);

            Box::pin(async move {
                backup_one_device(desc, registry, credentials, retry_policy, store).await
            })
        }
    }
}

async fn backup_one_device(
    desc: DeviceDescriptor,
    registry: DriverRegistry,
    credentials: Arc<HashMap<String, Credential>>,
    retry_policy: RetryPolicy,
    store: Arc<GitStore>,
) -> BackupResult {
    let started = Instant::now();

    if !desc.enabled {
        info!("Device '{}': disabled, skipping", desc.id);
        return BackupResult::skipped(&desc.id);
    }

    let driver = match registry.resolve(desc.platform) {
        Ok(driver) => driver,
        // Load-time validation makes this unreachable in practice
        Err(e) => return BackupResult::failed(&desc.id, e.to_string(), 0, started.elapsed()),
    };

    let cred = match credentials.get(&desc.credential_ref) {
        Some(cred) => cred.clone(),
        None => {
            return BackupResult::failed(
                &desc.id,
                format!("credential '{}' not resolved", desc.credential_ref),
                0,
                started.elapsed(),
            )
        }
    };

    let outcome = retry::run_with_retries(driver, &desc, &cred, &retry_policy).await;
    let attempts = outcome.attempt_count();

    let raw = match outcome.result {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Device '{}': backup failed: {}", desc.id, e);
            return BackupResult::failed(&desc.id, e.to_string(), attempts, started.elapsed());
        }
    };

    let raw_len = raw.len() as u64;
    let normalized = normalize::normalize(desc.platform.as_str(), &raw);
    let snapshot = Snapshot::new(&desc.id, desc.platform, normalized);
    let content_hash = snapshot.content_hash.clone();

    // Only successful retrievals reach the working tree; a staging failure
    // fails this device and leaves its previously committed file untouched
    if let Err(e) = store.stage(&snapshot).await {
        warn!("Device '{}': staging failed: {}", desc.id, e);
        return BackupResult::failed(&desc.id, e.to_string(), attempts, started.elapsed());
    }

    info!(
        "Device '{}': backup ok ({} bytes raw, {} attempt(s))",
        desc.id, raw_len, attempts
    );
    BackupResult::success(&desc.id, raw_len, content_hash, attempts, started.elapsed())
}
