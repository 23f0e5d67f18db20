//! Per-device results and the run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Terminal status of one device in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Success,
    Failed,
    Skipped,
}

/// One terminal result per device per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupResult {
    pub device_id: String,
    pub status: BackupStatus,
    /// Raw byte length as retrieved, before normalization
    #[serde(default)]
    pub raw_len: u64,
    /// SHA-256 of the normalized content (Success only)
    pub content_hash: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Connection attempts consumed (0 for Skipped)
    #[serde(default)]
    pub attempts: u32,
}

impl BackupResult {
    pub fn success(
        device_id: impl Into<String>,
        raw_len: u64,
        content_hash: String,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            status: BackupStatus::Success,
            raw_len,
            content_hash: Some(content_hash),
            error: None,
            duration_ms: duration.as_millis() as u64,
            attempts,
        }
    }

    pub fn failed(
        device_id: impl Into<String>,
        error: impl Into<String>,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            status: BackupStatus::Failed,
            raw_len: 0,
            content_hash: None,
            error: Some(error.into()),
            duration_ms: duration.as_millis() as u64,
            attempts,
        }
    }

    pub fn skipped(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            status: BackupStatus::Skipped,
            raw_len: 0,
            content_hash: None,
            error: None,
            duration_ms: 0,
            attempts: 0,
        }
    }
}

/// The complete outcome of one backup run, handed to the reporting layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Ordered by device id, independent of completion order
    pub results: Vec<BackupResult>,
}

impl RunReport {
    /// Finalize a report: results are sorted by device id.
    pub fn new(
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
        mut results: Vec<BackupResult>,
    ) -> Self {
        results.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at: Utc::now(),
            results,
        }
    }

    pub fn count(&self, status: BackupStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.count(BackupStatus::Failed) == 0
    }

    /// One-line summary used in the commit message and logs.
    pub fn summary_line(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} skipped",
            self.count(BackupStatus::Success),
            self.count(BackupStatus::Failed),
            self.count(BackupStatus::Skipped)
        )
    }
}
