use anyhow::Result;
use serde::Serialize;

use ctxvault::config::CtxConfig;
use ctxvault::manifest::Manifest;
use ctxvault::session::{self, SessionRecord};
use ctxvault::store::types::Entry;

/// Export format: the manifest plus every entry and session.
#[derive(Debug, Serialize)]
struct ExportData {
    manifest: Manifest,
    entries: Vec<Entry>,
    sessions: Vec<SessionRecord>,
}

/// Export the whole store as JSON to stdout.
pub fn export(config: &CtxConfig) -> Result<()> {
    let store = super::open_store(config)?;

    let data = ExportData {
        manifest: store.manifest()?,
        entries: store.list_all()?,
        sessions: session::list_sessions(&store)?,
    };

    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    eprintln!(
        "Exported {} entries and {} sessions.",
        data.entries.len(),
        data.sessions.len()
    );

    Ok(())
}
