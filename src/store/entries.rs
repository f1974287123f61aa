//! Entry CRUD over the working tree.
//!
//! Every mutation runs as one unit under the store lock: validate, allocate the
//! id, write the document atomically, persist the manifest counter, then update
//! the index. Reads take no lock.

use std::fs;
use std::path::Path;

use crate::error::{Result, StoreError};
use crate::fsio;
use crate::index::{Hits, IndexSnapshot, ReconcileReport};
use crate::lock::StoreLock;
use crate::manifest::Manifest;

use super::document;
use super::paths::{self, entry_path};
use super::types::{now, Entry, EntryContent, EntryKind};
use super::{ConsistencyReport, ContextStore, UnparsableEntry};

impl ContextStore {
    /// Create a new entry. The id comes from the payload (knowledge key, skill
    /// name) or the decision counter.
    pub fn create(&self, content: EntryContent) -> Result<Entry> {
        let guard = self.lock()?;
        self.create_locked(&guard, content)
    }

    pub(crate) fn create_locked(&self, guard: &StoreLock, mut content: EntryContent) -> Result<Entry> {
        let kind = content.kind();

        // 1. Validate before touching anything
        let implied = document::validate(&content)?;

        // 2. Resolve the id
        let (id, allocated) = match implied {
            Some(id) => {
                if self.abs_path(kind, &id).exists() {
                    return Err(StoreError::DuplicateId { kind, id });
                }
                (id, None)
            }
            None => {
                let manifest = self.manifest()?;
                let next = manifest
                    .next_number(kind)
                    .max(self.highest_decision()?.map_or(1, |n| n + 1));
                (paths::decision_id(next), Some(next))
            }
        };
        if let EntryContent::Skill(skill) = &mut content {
            skill.name = id.clone();
        }

        // 3. Write the document
        let created = now();
        let entry = Entry {
            id,
            kind,
            content,
            created_at: created,
            updated_at: created,
            revision: 1,
        };
        self.write_entry(&entry)?;

        // 4. Persist the counter
        if let Some(n) = allocated {
            Manifest::mutate(&self.root, guard, |m| {
                let slot = m.id_counters.entry(kind.as_str().to_string()).or_insert(1);
                *slot = (*slot).max(n + 1);
            })?;
        }

        // 5. Index
        self.index().index(&entry)?;

        tracing::info!(kind = %kind, id = %entry.id, "entry created");
        Ok(entry)
    }

    /// Read one entry by kind and id.
    pub fn read(&self, kind: EntryKind, id: &str) -> Result<Entry> {
        let id = normalize_id(kind, id);
        let rel = checked_path(kind, &id)?;
        let path = self.root.join(&rel);
        let bytes = fsio::read_optional(&path)?.ok_or_else(|| StoreError::not_found(kind, &id))?;
        document::parse(kind, &id, &String::from_utf8_lossy(&bytes))
    }

    /// Replace an entry's payload, bumping its revision. The key or name in the
    /// payload must match `id`.
    pub fn update(&self, kind: EntryKind, id: &str, content: EntryContent) -> Result<Entry> {
        let guard = self.lock()?;
        self.update_locked(&guard, kind, id, content)
    }

    pub(crate) fn update_locked(
        &self,
        _guard: &StoreLock,
        kind: EntryKind,
        id: &str,
        mut content: EntryContent,
    ) -> Result<Entry> {
        if content.kind() != kind {
            return Err(StoreError::validation(
                kind,
                format!("payload is a {}, not a {kind}", content.kind()),
            ));
        }
        let implied = document::validate(&content)?;
        let existing = self.read(kind, id)?;
        if let Some(implied) = implied {
            if implied != existing.id {
                return Err(StoreError::validation(
                    kind,
                    format!("cannot rename {} to {implied}; delete and recreate instead", existing.id),
                ));
            }
        }
        if let EntryContent::Skill(skill) = &mut content {
            skill.name = existing.id.clone();
        }

        let entry = Entry {
            id: existing.id,
            kind,
            content,
            created_at: existing.created_at,
            updated_at: now().max(existing.created_at),
            revision: existing.revision + 1,
        };
        self.write_entry(&entry)?;
        self.index().index(&entry)?;

        tracing::info!(kind = %kind, id = %entry.id, revision = entry.revision, "entry updated");
        Ok(entry)
    }

    /// Remove an entry and its postings. Decision counters are left alone.
    pub fn delete(&self, kind: EntryKind, id: &str) -> Result<()> {
        let guard = self.lock()?;
        self.delete_locked(&guard, kind, id)
    }

    pub(crate) fn delete_locked(&self, _guard: &StoreLock, kind: EntryKind, id: &str) -> Result<()> {
        let id = normalize_id(kind, id);
        let rel = checked_path(kind, &id)?;
        let path = self.root.join(&rel);
        if !fsio::remove_if_exists(&path)? {
            return Err(StoreError::not_found(kind, &id));
        }
        if kind == EntryKind::Skill {
            remove_empty_parent(&path);
        }
        self.index().remove(kind, &id)?;

        tracing::info!(kind = %kind, id = %id, "entry deleted");
        Ok(())
    }

    /// All parseable entries of a kind, ordered by id (decisions numerically).
    ///
    /// Unparsable documents are skipped with a warning; `check_consistency`
    /// reports them.
    pub fn list(&self, kind: EntryKind) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for (id, rel) in self.scan(kind)? {
            match self.parse_at(kind, &id, &rel) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(path = %rel, error = %e, "skipping unparsable entry"),
            }
        }
        Ok(entries)
    }

    /// Every parseable entry, grouped by kind.
    pub fn list_all(&self) -> Result<Vec<Entry>> {
        let mut all = Vec::new();
        for kind in EntryKind::ALL {
            all.extend(self.list(kind)?);
        }
        Ok(all)
    }

    /// Ranked full-text search.
    pub fn search(&self, query: &str, limit: Option<usize>) -> Result<Hits> {
        self.index().query(query, limit)
    }

    /// Discard the index and rebuild it from the documents.
    pub fn rebuild_index(&self) -> Result<usize> {
        let entries = self.list_all()?;
        self.index().rebuild(&entries)
    }

    /// Repair index drift caused by edits made outside this handle.
    pub fn reconcile_index(&self) -> Result<ReconcileReport> {
        let entries = self.list_all()?;
        self.index().reconcile(&entries)
    }

    /// Number of entries the index currently knows about.
    pub fn indexed_count(&self) -> Result<u64> {
        self.index().entry_count()
    }

    /// Full index contents, for comparing an incrementally maintained index
    /// against a fresh rebuild.
    pub fn index_snapshot(&self) -> Result<IndexSnapshot> {
        self.index().snapshot()
    }

    /// Re-read the given store-relative paths from disk and update the index.
    /// Paths that do not hold entries are ignored.
    pub(crate) fn reindex_paths<'a>(&self, rels: impl IntoIterator<Item = &'a String>) -> Result<usize> {
        let mut touched = 0;
        let mut index = self.index();
        for rel in rels {
            let Some((kind, id)) = paths::classify(rel) else {
                continue;
            };
            touched += 1;
            if !self.root.join(rel).exists() {
                index.remove(kind, &id)?;
                continue;
            }
            match self.parse_at(kind, &id, rel) {
                Ok(entry) => {
                    index.index(&entry)?;
                }
                Err(e) => {
                    tracing::warn!(path = %rel, error = %e, "unparsable entry dropped from index");
                    index.remove(kind, &id)?;
                }
            }
        }
        Ok(touched)
    }

    /// Verify the manifest loads, every document parses, and the decision counter
    /// is ahead of every existing ADR. Nothing is modified.
    pub fn check_consistency(&self) -> Result<ConsistencyReport> {
        let manifest = self.manifest()?;
        let mut report = ConsistencyReport {
            decision_counter: manifest.next_number(EntryKind::Decision),
            highest_decision: self.highest_decision()?,
            ..Default::default()
        };

        for kind in EntryKind::ALL {
            for (id, rel) in self.scan(kind)? {
                report.entries_checked += 1;
                if let Err(e) = self.parse_at(kind, &id, &rel) {
                    report.unparsable.push(UnparsableEntry {
                        kind,
                        path: rel,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// `(id, store-relative path)` of every document of a kind, in list order.
    fn scan(&self, kind: EntryKind) -> Result<Vec<(String, String)>> {
        let dir = self.root.join(kind.dir_name());
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut found = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| StoreError::io(&dir, e))?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let rel = match kind {
                EntryKind::Skill => format!("{}/{name}/{}", kind.dir_name(), paths::SKILL_FILE),
                _ => format!("{}/{name}", kind.dir_name()),
            };
            if let Some((k, id)) = paths::classify(&rel) {
                if k == kind && self.root.join(&rel).is_file() {
                    found.push((id, rel));
                }
            }
        }

        if kind == EntryKind::Decision {
            found.sort_by_key(|(id, _)| paths::parse_decision_id(id));
        } else {
            found.sort();
        }
        Ok(found)
    }

    pub(crate) fn highest_decision(&self) -> Result<Option<u64>> {
        Ok(self
            .scan(EntryKind::Decision)?
            .iter()
            .filter_map(|(id, _)| paths::parse_decision_id(id))
            .max())
    }

    fn parse_at(&self, kind: EntryKind, id: &str, rel: &str) -> Result<Entry> {
        let path = self.root.join(rel);
        let bytes = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
        document::parse(kind, id, &String::from_utf8_lossy(&bytes))
    }

    fn abs_path(&self, kind: EntryKind, id: &str) -> std::path::PathBuf {
        self.root.join(entry_path(kind, id))
    }

    fn write_entry(&self, entry: &Entry) -> Result<()> {
        let path = self.abs_path(entry.kind, &entry.id);
        fsio::write_atomic(&path, document::encode(entry).as_bytes())
    }
}

/// Skill names are case-insensitive and decision ids are conventionally upper
/// case; knowledge keys are taken as given.
fn normalize_id(kind: EntryKind, id: &str) -> String {
    match kind {
        EntryKind::Skill => id.to_ascii_lowercase(),
        EntryKind::Decision => id.to_ascii_uppercase(),
        EntryKind::Knowledge => id.to_string(),
    }
}

/// Path for an id, rejecting ids that would not map back to the same entry
/// (path traversal, malformed ADR numbers).
fn checked_path(kind: EntryKind, id: &str) -> Result<String> {
    let rel = entry_path(kind, id);
    match paths::classify(&rel) {
        Some((k, ref parsed)) if k == kind && parsed == id => Ok(rel),
        _ => Err(StoreError::not_found(kind, id)),
    }
}

fn remove_empty_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        // Fails harmlessly when other files remain.
        let _ = fs::remove_dir(parent);
    }
}
