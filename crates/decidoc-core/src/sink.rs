//! Analysis log sink — append-only persistence for classification and
//! analysis records.
//!
//! Both write operations are best-effort: sink unavailability is logged and
//! reported as `false`, never as an error. The webhook path must ack the
//! provider whether or not the log is reachable.
//!
//! File format: JSONL at `{dir}/{table}.jsonl`, one record per line.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::types::{AnalysisRecord, ClassificationRecord};

// ─────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────

/// Append-only store for the two persisted record kinds.
#[async_trait]
pub trait AnalysisLog: Send + Sync {
    /// Persist a classification record. Returns whether the write landed.
    async fn put_classification(&self, record: &ClassificationRecord) -> bool;

    /// Persist an analysis record. Returns whether the write landed.
    async fn put_analysis(&self, record: &AnalysisRecord) -> bool;
}

// ─────────────────────────────────────────────
// JSONL implementation
// ─────────────────────────────────────────────

/// JSONL-backed analysis log.
///
/// Appends are serialized through one mutex so concurrent record writes
/// from the webhook path and flush workers never interleave lines.
pub struct JsonlAnalysisLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAnalysisLog {
    /// Create a log writing to `{dir}/{table}.jsonl`.
    pub fn new(dir: impl Into<PathBuf>, table: &str) -> Self {
        let dir = dir.into();
        JsonlAnalysisLog {
            path: dir.join(format!("{table}.jsonl")),
            write_lock: Mutex::new(()),
        }
    }

    /// The log file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn append_line<T: Serialize>(&self, record: &T) -> bool {
        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "failed to serialize record for analysis log");
                return false;
            }
        };

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(error = %e, "failed to create analysis log directory");
                return false;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await;

        let mut file = match file {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "analysis log unavailable");
                return false;
            }
        };

        if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
            warn!(path = %self.path.display(), error = %e, "analysis log write failed");
            return false;
        }

        if let Err(e) = file.flush().await {
            warn!(path = %self.path.display(), error = %e, "analysis log flush failed");
            return false;
        }

        debug!(path = %self.path.display(), "record appended to analysis log");
        true
    }
}

#[async_trait]
impl AnalysisLog for JsonlAnalysisLog {
    async fn put_classification(&self, record: &ClassificationRecord) -> bool {
        self.append_line(record).await
    }

    async fn put_analysis(&self, record: &AnalysisRecord) -> bool {
        self.append_line(record).await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
