//! Project manifest: schema version, project name, id counters, adapters.
//!
//! `manifest.json` is shared through the context branch. The per-clone
//! `last_sync` record is kept beside it in `state/last_sync.json` so that
//! recording a sync never creates a new commit.

pub mod migrations;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::fsio;
use crate::lock::StoreLock;
use crate::store::paths::{MANIFEST_FILE, STATE_DIR};
use crate::store::types::EntryKind;

use migrations::CURRENT_SCHEMA_VERSION;

const LAST_SYNC_FILE: &str = "last_sync.json";

/// The last successful sync of this clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSync {
    /// Remote head the local branch was reconciled with.
    pub remote_ref: String,
    pub at: DateTime<Utc>,
}

/// Versioned project metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub project_name: String,
    /// Next sequence number per sequential kind (`"decision"`).
    #[serde(default)]
    pub id_counters: BTreeMap<String, u64>,
    /// Registered agent-tool adapter names.
    #[serde(default)]
    pub adapters: BTreeSet<String>,
    #[serde(skip)]
    pub last_sync: Option<LastSync>,
    /// Fields written by newer or foreign tooling, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    pub fn new(project_name: &str) -> Self {
        let mut id_counters = BTreeMap::new();
        id_counters.insert(EntryKind::Decision.as_str().to_string(), 1);
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            project_name: project_name.to_string(),
            id_counters,
            adapters: BTreeSet::new(),
            last_sync: None,
            extra: Map::new(),
        }
    }

    /// Load `manifest.json` (migrating older schemas) plus the local sync record.
    ///
    /// Fails closed with [`StoreError::CorruptManifest`]; a missing manifest means
    /// the store was never initialized.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let bytes = fsio::read_optional(&path)?
            .ok_or_else(|| StoreError::NotInitialized(root.to_path_buf()))?;
        let mut manifest = Self::parse(&bytes, &path)?;
        manifest.last_sync = load_last_sync(root);
        Ok(manifest)
    }

    /// Parse manifest bytes from disk or history. `origin` is only used in errors.
    pub fn parse(bytes: &[u8], origin: &Path) -> Result<Self> {
        let corrupt = |reason: String| StoreError::CorruptManifest {
            path: origin.to_path_buf(),
            reason,
        };

        let raw: Value = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
        let Value::Object(mut raw) = raw else {
            return Err(corrupt("manifest must be a JSON object".into()));
        };
        let from = migrations::run_migrations(&mut raw).map_err(|e| corrupt(e.to_string()))?;
        if from != CURRENT_SCHEMA_VERSION {
            tracing::info!(from, to = CURRENT_SCHEMA_VERSION, "manifest migrated in memory");
        }

        serde_json::from_value(Value::Object(raw)).map_err(|e| corrupt(e.to_string()))
    }

    /// Pretty JSON with a trailing newline, so diffs stay line-oriented.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Persist `manifest.json` atomically. Skips the write when nothing changed.
    pub fn save(&self, root: &Path, _lock: &StoreLock) -> Result<()> {
        let path = root.join(MANIFEST_FILE);
        let bytes = self.to_bytes()?;
        if fsio::read_optional(&path)?.as_deref() == Some(bytes.as_slice()) {
            return Ok(());
        }
        fsio::write_atomic(&path, &bytes)
    }

    /// Load, transform, and persist under the store lock.
    pub fn mutate(
        root: &Path,
        lock: &StoreLock,
        f: impl FnOnce(&mut Manifest),
    ) -> Result<Manifest> {
        let mut manifest = Self::load(root)?;
        let before = manifest.clone();
        f(&mut manifest);
        if manifest != before {
            manifest.save(root, lock)?;
        }
        Ok(manifest)
    }

    /// Record a completed sync for this clone.
    pub fn record_sync(root: &Path, _lock: &StoreLock, last_sync: &LastSync) -> Result<()> {
        let path = root.join(STATE_DIR).join(LAST_SYNC_FILE);
        fsio::write_atomic(&path, &serde_json::to_vec_pretty(last_sync)?)
    }

    /// Next sequence number for a sequential kind (never below 1).
    pub fn next_number(&self, kind: EntryKind) -> u64 {
        self.id_counters
            .get(kind.as_str())
            .copied()
            .unwrap_or(1)
            .max(1)
    }

    /// Three-way merge of manifests from two histories. Never conflicts:
    /// counters take the maximum, adapters are unioned, and scalar fields keep
    /// ours unless only theirs changed them.
    pub fn merge(base: Option<&Manifest>, ours: &Manifest, theirs: &Manifest) -> Manifest {
        let mut merged = ours.clone();
        merged.schema_version = ours.schema_version.max(theirs.schema_version);

        let base_name = base.map(|b| b.project_name.as_str());
        if ours.project_name != theirs.project_name && base_name == Some(ours.project_name.as_str())
        {
            merged.project_name = theirs.project_name.clone();
        }

        for (kind, next) in &theirs.id_counters {
            let slot = merged.id_counters.entry(kind.clone()).or_insert(*next);
            *slot = (*slot).max(*next);
        }
        merged.adapters.extend(theirs.adapters.iter().cloned());

        // Unknown keys merge one by one: take theirs only where ours still
        // matches the base, so a deletion on either side is kept.
        let keys: BTreeSet<&String> = ours.extra.keys().chain(theirs.extra.keys()).collect();
        for key in keys {
            let base_value = base.and_then(|b| b.extra.get(key));
            let ours_value = ours.extra.get(key);
            let theirs_value = theirs.extra.get(key);
            if ours_value != base_value || theirs_value == base_value {
                continue;
            }
            match theirs_value {
                Some(value) => {
                    merged.extra.insert(key.clone(), value.clone());
                }
                None => {
                    merged.extra.remove(key);
                }
            }
        }
        merged
    }
}

fn load_last_sync(root: &Path) -> Option<LastSync> {
    let path = root.join(STATE_DIR).join(LAST_SYNC_FILE);
    let bytes = fsio::read_optional(&path).ok()??;
    match serde_json::from_slice(&bytes) {
        Ok(last) => Some(last),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable sync record");
            None
        }
    }
}
