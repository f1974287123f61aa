//! Persistent record of unresolved sync conflicts (`state/conflicts.json`) and the
//! conflict copies that hold remote variants.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConflictReport, Result, StoreError};
use crate::fsio;
use crate::store::document::digest_bytes;
use crate::store::paths::{self, CONFLICTS_FILE, STATE_DIR};
use crate::store::types::EntryKind;

/// One conflicted entry awaiting resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub path: String,
    pub kind: EntryKind,
    pub id: String,
    /// Remote head the conflicting variant was read from.
    pub remote_ref: String,
    pub remote_digest: String,
    /// Digest of the local variant when the conflict was detected.
    pub local_digest: String,
    pub detected_at: DateTime<Utc>,
}

impl ConflictRecord {
    pub fn report(&self) -> ConflictReport {
        ConflictReport {
            kind: self.kind,
            id: self.id.clone(),
            local_path: self.path.clone(),
            remote_copy_path: paths::conflict_copy_path(&self.path),
        }
    }

    /// The local document no longer matches the variant that conflicted: whatever
    /// the user left there is the resolution.
    pub fn resolved_by_local(&self, current: Option<&[u8]>) -> bool {
        digest_of(current) != self.local_digest
    }
}

/// Digest of optional file contents; a missing file hashes as empty.
pub fn digest_of(bytes: Option<&[u8]>) -> String {
    digest_bytes(bytes.unwrap_or_default())
}

/// Load the open conflicts. An unreadable record file is an error, never an
/// empty set: pending conflicts must not vanish.
pub fn load(root: &Path) -> Result<Vec<ConflictRecord>> {
    let path = root.join(STATE_DIR).join(CONFLICTS_FILE);
    let Some(bytes) = fsio::read_optional(&path)? else {
        return Ok(Vec::new());
    };
    serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptState {
        path,
        reason: e.to_string(),
    })
}

/// Persist the record set. An empty set removes the file; an unchanged set is
/// not rewritten.
pub fn save(root: &Path, records: &[ConflictRecord]) -> Result<()> {
    let path = root.join(STATE_DIR).join(CONFLICTS_FILE);
    if records.is_empty() {
        fsio::remove_if_exists(&path)?;
        return Ok(());
    }
    let bytes = serde_json::to_vec_pretty(records)?;
    if fsio::read_optional(&path)?.as_deref() == Some(bytes.as_slice()) {
        return Ok(());
    }
    fsio::write_atomic(&path, &bytes)
}

/// Write the remote variant beside the local document.
pub fn write_copy(root: &Path, entry_path: &str, remote: &[u8]) -> Result<()> {
    let copy = root.join(paths::conflict_copy_path(entry_path));
    if fsio::read_optional(&copy)?.as_deref() == Some(remote) {
        return Ok(());
    }
    fsio::write_atomic(&copy, remote)
}

pub fn remove_copy(root: &Path, entry_path: &str) -> Result<()> {
    fsio::remove_if_exists(&root.join(paths::conflict_copy_path(entry_path)))?;
    Ok(())
}
