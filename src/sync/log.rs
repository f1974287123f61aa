//! Append-only sync history (`state/sync.log.jsonl`), one JSON object per line.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::fsio;
use crate::store::paths::{STATE_DIR, SYNC_LOG_FILE};

use super::{SyncMode, SyncPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Ok,
    Conflict,
    Failed,
}

/// One completed sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub at: DateTime<Utc>,
    pub mode: SyncMode,
    pub status: SyncStatus,
    pub local_head: Option<String>,
    pub remote_head: Option<String>,
    pub committed: bool,
    pub applied_paths: usize,
    pub pushed: bool,
    pub conflicts: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Phases walked, ending in `failed` for an attempt that did not complete.
    #[serde(default)]
    pub phases: Vec<SyncPhase>,
}

pub fn append(root: &Path, event: &SyncEvent) -> Result<()> {
    let path = root.join(STATE_DIR).join(SYNC_LOG_FILE);
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| StoreError::io(&path, e))?;
    file.write_all(&line).map_err(|e| StoreError::io(&path, e))
}

/// The last `n` events, newest first. Unreadable lines are skipped.
pub fn recent(root: &Path, n: usize) -> Result<Vec<SyncEvent>> {
    let path = root.join(STATE_DIR).join(SYNC_LOG_FILE);
    let Some(bytes) = fsio::read_optional(&path)? else {
        return Ok(Vec::new());
    };
    let text = String::from_utf8_lossy(&bytes);
    Ok(text
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str(line).ok())
        .take(n)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(status: SyncStatus) -> SyncEvent {
        SyncEvent {
            at: Utc::now(),
            mode: SyncMode::Push,
            status,
            local_head: Some("abc".into()),
            remote_head: None,
            committed: true,
            applied_paths: 0,
            pushed: false,
            conflicts: 0,
            note: None,
            error: None,
            phases: vec![SyncPhase::Committing, SyncPhase::Idle],
        }
    }

    #[test]
    fn recent_is_newest_first_and_skips_garbage() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(STATE_DIR)).unwrap();
        append(tmp.path(), &event(SyncStatus::Ok)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(tmp.path().join(STATE_DIR).join(SYNC_LOG_FILE))
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();
        append(tmp.path(), &event(SyncStatus::Failed)).unwrap();

        let events = recent(tmp.path(), 5).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, SyncStatus::Failed);
        assert_eq!(recent(tmp.path(), 1).unwrap().len(), 1);
    }
}
