//! Derived term index over entry content.
//!
//! The index is never authoritative: it can be discarded and rebuilt from the
//! entry documents at any time. [`SearchIndex::rebuild`] produces exactly the
//! postings that incremental [`SearchIndex::index`] calls reach, and
//! [`SearchIndex::snapshot`] exposes them for comparison.

pub mod schema;
pub mod tokenize;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::store::document;
use crate::store::types::{Entry, EntryKind};

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub kind: EntryKind,
    pub id: String,
    /// First matching line: 0 is the title/key field, body lines start at 1.
    pub line: u32,
    pub score: f64,
}

/// Ranked results: score descending, then kind and id ascending.
///
/// Finite and restartable; iterate as many times as needed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Hits {
    hits: Vec<Hit>,
}

impl Hits {
    pub fn iter(&self) -> std::slice::Iter<'_, Hit> {
        self.hits.iter()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn into_vec(self) -> Vec<Hit> {
        self.hits
    }
}

impl IntoIterator for Hits {
    type Item = Hit;
    type IntoIter = std::vec::IntoIter<Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

impl<'a> IntoIterator for &'a Hits {
    type Item = &'a Hit;
    type IntoIter = std::slice::Iter<'a, Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

/// A single posting row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub term: String,
    pub kind: String,
    pub entry_id: String,
    pub line: u32,
    pub weight: u32,
}

/// Full index contents in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSnapshot {
    /// `(kind, id, revision, digest)` per indexed entry.
    pub entries: Vec<(String, String, u64, String)>,
    pub postings: Vec<Posting>,
}

/// Counts from a [`SearchIndex::reconcile`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub reindexed: usize,
    pub removed: usize,
}

/// SQLite-backed postings index.
pub struct SearchIndex {
    conn: Connection,
    needs_rebuild: bool,
}

impl SearchIndex {
    /// Open (or create) the index database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        let needs_rebuild = schema::init_schema(&conn)?;
        tracing::debug!(path = %path.display(), needs_rebuild, "search index opened");
        Ok(Self {
            conn,
            needs_rebuild,
        })
    }

    /// In-memory index, used by tests and for throwaway comparisons.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let needs_rebuild = schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            needs_rebuild,
        })
    }

    /// Whether the index was just created or discarded and must be rebuilt.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Index one entry. A no-op (returns `false`) when this exact revision and
    /// content are already indexed; otherwise prior postings for the id are
    /// replaced.
    pub fn index(&mut self, entry: &Entry) -> Result<bool> {
        let digest = document::digest(entry);
        let tx = self.conn.transaction()?;

        let current: Option<(i64, String)> = tx
            .query_row(
                "SELECT revision, digest FROM indexed_entries WHERE kind = ?1 AND entry_id = ?2",
                params![entry.kind.as_str(), entry.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if current == Some((entry.revision as i64, digest.clone())) {
            return Ok(false);
        }

        write_entry(&tx, entry, &digest)?;
        tx.commit()?;
        Ok(true)
    }

    /// Drop all postings for an entry. Returns whether it was indexed.
    pub fn remove(&mut self, kind: EntryKind, id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let removed = delete_entry(&tx, kind, id)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Ranked term query. `limit` caps the number of hits.
    pub fn query(&self, text: &str, limit: Option<usize>) -> Result<Hits> {
        let terms: BTreeSet<String> = tokenize::tokenize(text).collect();
        if terms.is_empty() {
            return Ok(Hits::default());
        }

        let placeholders = vec!["?"; terms.len()].join(", ");
        let limit_clause = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
        let sql = format!(
            "SELECT kind, entry_id, MIN(line), SUM(weight) AS score FROM postings \
             WHERE term IN ({placeholders}) \
             GROUP BY kind, entry_id \
             ORDER BY score DESC, kind ASC, entry_id ASC{limit_clause}"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let hits = stmt
            .query_map(params_from_iter(terms.iter()), |row| {
                let kind: String = row.get(0)?;
                Ok(Hit {
                    kind: kind.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
                    id: row.get(1)?,
                    line: row.get(2)?,
                    score: row.get::<_, i64>(3)? as f64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Hits { hits })
    }

    /// Discard everything and index `entries` in kind/id order.
    pub fn rebuild<'a>(&mut self, entries: impl IntoIterator<Item = &'a Entry>) -> Result<usize> {
        let mut sorted: Vec<&Entry> = entries.into_iter().collect();
        sorted.sort_by(|a, b| (a.kind, &a.id).cmp(&(b.kind, &b.id)));

        let tx = self.conn.transaction()?;
        tx.execute_batch("DELETE FROM postings; DELETE FROM indexed_entries;")?;
        for entry in &sorted {
            write_entry(&tx, entry, &document::digest(entry))?;
        }
        tx.commit()?;

        self.needs_rebuild = false;
        tracing::info!(entries = sorted.len(), "search index rebuilt");
        Ok(sorted.len())
    }

    /// Bring the index in line with `entries`: reindex entries whose revision or
    /// content changed, drop entries that no longer exist.
    pub fn reconcile<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a Entry>,
    ) -> Result<ReconcileReport> {
        let indexed = self.indexed_versions()?;
        let mut report = ReconcileReport::default();
        let mut seen = BTreeSet::new();

        let tx = self.conn.transaction()?;
        for entry in entries {
            let key = (entry.kind.as_str().to_string(), entry.id.clone());
            let digest = document::digest(entry);
            if indexed.get(&key) != Some(&(entry.revision, digest.clone())) {
                write_entry(&tx, entry, &digest)?;
                report.reindexed += 1;
            }
            seen.insert(key);
        }
        for (kind, id) in indexed.keys() {
            if !seen.contains(&(kind.clone(), id.clone())) {
                let kind: EntryKind = kind.parse().map_err(|_| rusqlite::Error::InvalidQuery)?;
                delete_entry(&tx, kind, id)?;
                report.removed += 1;
            }
        }
        tx.commit()?;

        self.needs_rebuild = false;
        if report != ReconcileReport::default() {
            tracing::info!(
                reindexed = report.reindexed,
                removed = report.removed,
                "search index reconciled"
            );
        }
        Ok(report)
    }

    /// Everything in the index, in canonical order.
    pub fn snapshot(&self) -> Result<IndexSnapshot> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, entry_id, revision, digest FROM indexed_entries ORDER BY kind, entry_id",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? as u64, row.get(3)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT term, kind, entry_id, line, weight FROM postings \
             ORDER BY term, kind, entry_id, line",
        )?;
        let postings = stmt
            .query_map([], |row| {
                Ok(Posting {
                    term: row.get(0)?,
                    kind: row.get(1)?,
                    entry_id: row.get(2)?,
                    line: row.get(3)?,
                    weight: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(IndexSnapshot { entries, postings })
    }

    /// Number of indexed entries.
    pub fn entry_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM indexed_entries", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn indexed_versions(&self) -> Result<BTreeMap<(String, String), (u64, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, entry_id, revision, digest FROM indexed_entries")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                    (row.get::<_, i64>(2)? as u64, row.get::<_, String>(3)?),
                ))
            })?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }
}

fn write_entry(tx: &Transaction, entry: &Entry, digest: &str) -> Result<()> {
    delete_entry(tx, entry.kind, &entry.id)?;

    let mut insert = tx.prepare_cached(
        "INSERT INTO postings (term, kind, entry_id, line, weight) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for ((term, line), weight) in tokenize::line_postings(&entry.search_lines()) {
        insert.execute(params![term, entry.kind.as_str(), entry.id, line, weight])?;
    }

    tx.execute(
        "INSERT INTO indexed_entries (kind, entry_id, revision, digest) VALUES (?1, ?2, ?3, ?4)",
        params![entry.kind.as_str(), entry.id, entry.revision as i64, digest],
    )?;
    Ok(())
}

fn delete_entry(tx: &Transaction, kind: EntryKind, id: &str) -> Result<bool> {
    tx.execute(
        "DELETE FROM postings WHERE kind = ?1 AND entry_id = ?2",
        params![kind.as_str(), id],
    )?;
    let rows = tx.execute(
        "DELETE FROM indexed_entries WHERE kind = ?1 AND entry_id = ?2",
        params![kind.as_str(), id],
    )?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{now, EntryContent, KnowledgeContent};

    fn note(key: &str, content: &str, revision: u64) -> Entry {
        let t = now();
        Entry {
            id: key.into(),
            kind: EntryKind::Knowledge,
            content: EntryContent::Knowledge(KnowledgeContent {
                key: key.into(),
                content: content.into(),
            }),
            created_at: t,
            updated_at: t,
            revision,
        }
    }

    #[test]
    fn reindexing_same_revision_is_noop() {
        let mut index = SearchIndex::open_in_memory().unwrap();
        let entry = note("arch", "hexagonal layers", 1);
        assert!(index.index(&entry).unwrap());
        assert!(!index.index(&entry).unwrap());
    }

    #[test]
    fn new_revision_replaces_old_postings() {
        let mut index = SearchIndex::open_in_memory().unwrap();
        index.index(&note("arch", "monolith", 1)).unwrap();
        index.index(&note("arch", "microservices", 2)).unwrap();

        assert!(index.query("monolith", None).unwrap().is_empty());
        assert_eq!(index.query("microservices", None).unwrap().len(), 1);
    }

    #[test]
    fn ranking_is_by_frequency_then_id() {
        let mut index = SearchIndex::open_in_memory().unwrap();
        index.index(&note("b-note", "cache", 1)).unwrap();
        index.index(&note("a-note", "cache", 1)).unwrap();
        index.index(&note("c-note", "cache cache cache", 1)).unwrap();

        let ids: Vec<String> = index
            .query("cache", None)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["c-note", "a-note", "b-note"]);
    }

    #[test]
    fn key_matches_outrank_body_matches() {
        let mut index = SearchIndex::open_in_memory().unwrap();
        index.index(&note("postgres", "notes", 1)).unwrap();
        index.index(&note("other", "postgres", 1)).unwrap();

        let hits = index.query("Postgres", None).unwrap();
        let first = hits.iter().next().unwrap();
        assert_eq!(first.id, "postgres");
        assert_eq!(first.line, 0);
    }

    #[test]
    fn hits_are_restartable() {
        let mut index = SearchIndex::open_in_memory().unwrap();
        index.index(&note("a", "alpha beta", 1)).unwrap();
        let hits = index.query("alpha", None).unwrap();
        assert_eq!(hits.iter().count(), 1);
        assert_eq!(hits.iter().count(), 1);
    }

    #[test]
    fn reconcile_drops_missing_and_reindexes_changed() {
        let mut index = SearchIndex::open_in_memory().unwrap();
        index.index(&note("gone", "old", 1)).unwrap();
        index.index(&note("kept", "v1", 1)).unwrap();

        let kept = note("kept", "v2 edited elsewhere", 1);
        let report = index.reconcile([&kept]).unwrap();

        assert_eq!(report, ReconcileReport { reindexed: 1, removed: 1 });
        assert!(index.query("old", None).unwrap().is_empty());
        assert_eq!(index.query("edited", None).unwrap().len(), 1);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let index = SearchIndex::open_in_memory().unwrap();
        assert!(index.query("  + ", None).unwrap().is_empty());
    }
}
