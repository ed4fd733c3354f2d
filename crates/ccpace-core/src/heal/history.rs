//! Capped, append-only audit log of healing runs.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::classify::FailureCategory;
use crate::error::HealError;

/// One healing outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: NaiveDateTime,
    pub success: bool,
    pub failure_type: FailureCategory,
    #[serde(default)]
    pub fix_applied: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl HistoryEntry {
    /// `timestamp: [OK|FAIL] category - fix`
    pub fn summary(&self) -> String {
        format!(
            "{}: [{}] {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            if self.success { "OK" } else { "FAIL" },
            self.failure_type,
            self.fix_applied.as_deref().unwrap_or("none")
        )
    }
}

/// JSON array on disk, oldest first, at most `cap` entries
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
    cap: usize,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: path.into(),
            cap: cap.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries; a missing or unreadable log reads as empty
    pub fn load(&self) -> Vec<HistoryEntry> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read heal history {:?}: {}", self.path, e);
                return Vec::new();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring corrupt heal history {:?}: {}", self.path, e);
            Vec::new()
        })
    }

    /// The newest `n` entries, oldest first
    pub fn last(&self, n: usize) -> Vec<HistoryEntry> {
        let mut entries = self.load();
        let skip = entries.len().saturating_sub(n);
        entries.drain(..skip);
        entries
    }

    /// Append and drop the oldest entries beyond the cap
    pub fn append(&self, entry: HistoryEntry) -> Result<(), HealError> {
        let mut entries = self.load();
        entries.push(entry);
        let excess = entries.len().saturating_sub(self.cap);
        entries.drain(..excess);

        let json = serde_json::to_string_pretty(&entries)?;
        self.write_atomic(json.as_bytes())
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), HealError> {
        let err = |source| HealError::History {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(err)?;
        file.write_all(bytes).map_err(err)?;
        file.sync_all().map_err(err)?;
        fs::rename(&tmp, &self.path).map_err(err)
    }
}
