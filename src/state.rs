//! Scrape state persisted between runs.
//!
//! The state is loaded once at startup, mutated by [`crate::forum::scan`] and
//! written back exactly once after a successful run.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::forum::ThreadRecord;

/// Last known snapshot of a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadSnapshot {
    pub last_pid: u64,
    pub last_time: String,
    pub title: String,
    pub link: String,
}

impl From<&ThreadRecord> for ThreadSnapshot {
    fn from(record: &ThreadRecord) -> Self {
        Self {
            last_pid: record.last_post_id,
            last_time: record.last_post_time.clone(),
            title: record.title.clone(),
            link: record.link.clone(),
        }
    }
}

/// Everything seen by previous runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeState {
    /// High-water mark: the largest last post id seen in any prior run.
    #[serde(rename = "max_seen_pid")]
    pub max_seen_post_id: u64,
    pub threads: BTreeMap<String, ThreadSnapshot>,
}

impl ScrapeState {
    /// Load state from `path`.
    ///
    /// A missing, unreadable or malformed file yields an empty state; this
    /// never fails.
    pub async fn load(path: &Path) -> Self {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file, starting fresh");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), "Failed to read state file, starting fresh: {e}");
                return Self::default();
            }
        };

        Self::from_json(&text).unwrap_or_else(|| {
            warn!(path = %path.display(), "Malformed state file, starting fresh");
            Self::default()
        })
    }

    /// Decode a state document.
    ///
    /// Returns `None` when the text is not a JSON object. A missing or
    /// malformed `threads` mapping becomes empty; a missing `max_seen_pid` is
    /// derived from the stored threads.
    #[must_use]
    pub fn from_json(text: &str) -> Option<Self> {
        let Ok(Value::Object(mut root)) = serde_json::from_str::<Value>(text) else {
            return None;
        };

        let threads: BTreeMap<String, ThreadSnapshot> = root
            .remove("threads")
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let max_seen_post_id = root
            .get("max_seen_pid")
            .and_then(Value::as_u64)
            .unwrap_or_else(|| threads.values().map(|t| t.last_pid).max().unwrap_or(0));

        Some(Self {
            max_seen_post_id,
            threads,
        })
    }

    /// Write state to `path`, replacing any previous file.
    ///
    /// The document goes to a sibling temporary file first and is renamed
    /// into place.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create state directory: {}", parent.display())
                })?;
            }
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize state")?;

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("Failed to write state file: {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        debug!(path = %path.display(), threads = self.threads.len(), "State saved");
        Ok(())
    }

    /// Record the latest snapshot of a thread, returning the previous one.
    pub fn upsert(&mut self, record: &ThreadRecord) -> Option<ThreadSnapshot> {
        self.threads
            .insert(record.thread_id.clone(), ThreadSnapshot::from(record))
    }
}
