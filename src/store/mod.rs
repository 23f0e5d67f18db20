//! Snapshot persistence
//!
//! One normalized file per device inside a git working tree, one commit per
//! backup run.

mod git;

pub use git::{GitStore, StoreError};

use crate::config::Platform;
use crate::normalize;
use chrono::{DateTime, Utc};

/// Normalized configuration for one device at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub device_id: String,
    pub platform: Platform,
    pub content: String,
    pub content_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot from already-normalized content.
    pub fn new(device_id: impl Into<String>, platform: Platform, content: String) -> Self {
        let content_hash = normalize::content_hash(&content);
        Self {
            device_id: device_id.into(),
            platform,
            content,
            content_hash,
            timestamp: Utc::now(),
        }
    }
}
