//! Agent sessions and the onboarding summary.
//!
//! Sessions are small JSON records under `sessions/`, committed with the rest of
//! the context so teammates can see who worked on what. [`onboarding`] is a
//! read-only projection over the manifest, entries, conflicts, and sync history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConflictReport, Result, StoreError};
use crate::fsio;
use crate::manifest::LastSync;
use crate::store::paths::SESSIONS_DIR;
use crate::store::types::{now, EntryContent, EntryKind};
use crate::store::ContextStore;
use crate::sync::conflicts;
use crate::sync::log::{self as sync_log, SyncEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub agent: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Open a session for `agent`.
pub fn start_session(store: &ContextStore, agent: &str) -> Result<SessionRecord> {
    let _guard = store.lock()?;
    let record = SessionRecord {
        id: Uuid::now_v7().to_string(),
        agent: agent.to_string(),
        started_at: now(),
        ended_at: None,
        summary: None,
    };
    write_session(store, &record)?;
    tracing::info!(session = %record.id, agent, "session started");
    Ok(record)
}

/// Close a session, optionally recording what was done.
pub fn end_session(store: &ContextStore, id: &str, summary: Option<&str>) -> Result<SessionRecord> {
    let _guard = store.lock()?;
    let mut record = read_session(store, id)?;
    record.ended_at = Some(now().max(record.started_at));
    record.summary = summary.map(str::to_string);
    write_session(store, &record)?;
    tracing::info!(session = %record.id, "session ended");
    Ok(record)
}

/// All sessions, oldest first. Unreadable files are skipped.
pub fn list_sessions(store: &ContextStore) -> Result<Vec<SessionRecord>> {
    let dir = store.root().join(SESSIONS_DIR);
    let read_dir = match std::fs::read_dir(&dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&dir, e)),
    };

    let mut sessions = Vec::new();
    for dir_entry in read_dir {
        let path = dir_entry.map_err(|e| StoreError::io(&dir, e))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(bytes) = fsio::read_optional(&path)? else {
            continue;
        };
        match serde_json::from_slice::<SessionRecord>(&bytes) {
            Ok(record) => sessions.push(record),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session"),
        }
    }
    sessions.sort_by(|a, b| (a.started_at, &a.id).cmp(&(b.started_at, &b.id)));
    Ok(sessions)
}

fn session_path(store: &ContextStore, id: &str) -> Result<std::path::PathBuf> {
    let uuid = Uuid::parse_str(id).map_err(|_| StoreError::SessionNotFound(id.to_string()))?;
    Ok(store.root().join(SESSIONS_DIR).join(format!("{uuid}.json")))
}

fn read_session(store: &ContextStore, id: &str) -> Result<SessionRecord> {
    let path = session_path(store, id)?;
    let bytes = fsio::read_optional(&path)?.ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_session(store: &ContextStore, record: &SessionRecord) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(record)?;
    bytes.push(b'\n');
    fsio::write_atomic(&session_path(store, &record.id)?, &bytes)
}

/// A recently touched entry.
#[derive(Debug, Clone, Serialize)]
pub struct RecentEntry {
    pub kind: EntryKind,
    pub id: String,
    pub title: String,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// One line per decision: id, title, status.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionLine {
    pub id: String,
    pub title: String,
    pub status: String,
}

/// Everything an agent needs to pick up work on a project.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingSummary {
    pub project_name: String,
    pub schema_version: u32,
    pub adapters: Vec<String>,
    pub counts: BTreeMap<String, usize>,
    pub decisions: Vec<DecisionLine>,
    pub skills: Vec<String>,
    pub recent_entries: Vec<RecentEntry>,
    pub open_conflicts: Vec<ConflictReport>,
    pub last_sync: Option<LastSync>,
    pub recent_syncs: Vec<SyncEvent>,
    pub last_session: Option<SessionRecord>,
}

/// Build the onboarding summary. Read-only.
pub fn onboarding(
    store: &ContextStore,
    recent_items: usize,
    recent_syncs: usize,
) -> Result<OnboardingSummary> {
    let manifest = store.manifest()?;
    let entries = store.list_all()?;

    let mut counts: BTreeMap<String, usize> = EntryKind::ALL
        .iter()
        .map(|k| (k.as_str().to_string(), 0))
        .collect();
    let mut decisions = Vec::new();
    let mut skills = Vec::new();
    for entry in &entries {
        *counts.entry(entry.kind.as_str().to_string()).or_default() += 1;
        match &entry.content {
            EntryContent::Decision(d) => decisions.push(DecisionLine {
                id: entry.id.clone(),
                title: d.title.clone(),
                status: d.status.to_string(),
            }),
            EntryContent::Skill(s) => skills.push(format!("{}: {}", s.name, s.description)),
            EntryContent::Knowledge(_) => {}
        }
    }

    let mut recent: Vec<&_> = entries.iter().collect();
    recent.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| (a.kind, &a.id).cmp(&(b.kind, &b.id)))
    });
    let recent_entries = recent
        .into_iter()
        .take(recent_items)
        .map(|e| RecentEntry {
            kind: e.kind,
            id: e.id.clone(),
            title: e.title().to_string(),
            revision: e.revision,
            updated_at: e.updated_at,
        })
        .collect();

    Ok(OnboardingSummary {
        project_name: manifest.project_name.clone(),
        schema_version: manifest.schema_version,
        adapters: manifest.adapters.iter().cloned().collect(),
        counts,
        decisions,
        skills,
        recent_entries,
        open_conflicts: conflicts::load(store.root())?
            .iter()
            .map(conflicts::ConflictRecord::report)
            .collect(),
        last_sync: manifest.last_sync,
        recent_syncs: sync_log::recent(store.root(), recent_syncs)?,
        last_session: list_sessions(store)?.pop(),
    })
}
