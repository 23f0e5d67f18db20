//! Bounded task dispatch
//!
//! Runs exactly one backup task per device with a semaphore-bounded worker
//! pool. Each task is fenced: per-device timeout, run-level cancellation,
//! and panic capture at the join boundary all convert into a Failed result
//! for that device without touching its siblings.

use crate::config::DeviceDescriptor;
use crate::managers::report::BackupResult;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

/// Dispatch limits for one run.
#[derive(Debug, Clone, Copy)]
pub struct DispatchLimits {
    pub workers: usize,
    pub device_timeout: Duration,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            workers: 8,
            device_timeout: Duration::from_secs(120),
        }
    }
}

/// Run-level cancellation source. Dropping it does not cancel; call
/// `cancel` explicitly (wired to Ctrl-C by the CLI).
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

/// Cheap clonable view of the cancellation signal.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the run is cancelled.
    pub async fn cancelled(mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Source dropped without cancelling; never resolve
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Run one task per device with bounded parallelism.
///
/// Returns when every task has reached a terminal state; the output holds
/// exactly one `BackupResult` per input device, in input order.
pub async fn dispatch<F, Fut>(
    devices: Vec<DeviceDescriptor>,
    limits: DispatchLimits,
    cancel: CancelToken,
    task: F,
) -> Vec<BackupResult>
where
    F: Fn(DeviceDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BackupResult> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limits.workers.max(1)));
    let task = Arc::new(task);
    let mut handles = Vec::with_capacity(devices.len());

    for desc in devices {
        let sem = Arc::clone(&semaphore);
        let task = Arc::clone(&task);
        let cancel = cancel.clone();
        let device_id = desc.id.clone();
        let started = Instant::now();

        let task_id = device_id.clone();
        let handle = tokio::spawn(async move {
            // Backpressure: excess devices wait here, not in flight
            let _permit = sem
                .acquire_owned()
                .await
                .expect("dispatch semaphore closed");

            if cancel.is_cancelled() {
                return BackupResult::failed(
                    &task_id,
                    "cancelled before start",
                    0,
                    started.elapsed(),
                );
            }

            debug!("Device '{}': task started", task_id);

            tokio::select! {
                outcome = tokio::time::timeout(limits.device_timeout, (*task)(desc)) => {
                    match outcome {
                        Ok(result) => result,
                        Err(_) => {
                            // The task future is dropped here; session
                            // teardown runs through Drop, best-effort.
                            warn!(
                                "Device '{}': timed out after {:?}",
                                task_id, limits.device_timeout
                            );
                            BackupResult::failed(
                                &task_id,
                                format!("timed out after {:?}", limits.device_timeout),
                                0,
                                started.elapsed(),
                            )
                        }
                    }
                }
                _ = cancel.clone().cancelled() => {
                    warn!("Device '{}': cancelled", task_id);
                    BackupResult::failed(&task_id, "run cancelled", 0, started.elapsed())
                }
            }
        });

        handles.push((device_id, started, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (device_id, started, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            // A panicking task fails only its own device
            Err(join_err) => {
                warn!("Device '{}': task panicked: {}", device_id, join_err);
                results.push(BackupResult::failed(
                    &device_id,
                    format!("task panicked: {}", join_err),
                    0,
                    started.elapsed(),
                ));
            }
        }
    }

    results
}
