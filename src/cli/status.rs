//! CLI `status` command: counts, sync state, and open conflicts.

use anyhow::Result;

use ctxvault::config::CtxConfig;
use ctxvault::session;
use ctxvault::store::types::EntryKind;

/// Display store statistics and sync state in the terminal.
pub fn status(config: &CtxConfig) -> Result<()> {
    let store = super::open_store(config)?;
    let summary = session::onboarding(&store, 5, 1)?;

    println!("Context Store: {}", summary.project_name);
    println!("{}", "=".repeat(40));
    println!("  Root:                {}", store.root().display());
    println!("  Schema version:      {}", summary.schema_version);
    println!();

    println!("Entries:");
    for kind in EntryKind::ALL {
        let count = summary.counts.get(kind.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {}", kind.as_str(), count);
    }
    println!();

    match &summary.last_sync {
        Some(last) => println!("Last sync:             {} ({})", last.at, last.remote_ref),
        None => println!("Last sync:             never"),
    }
    if let Some(event) = summary.recent_syncs.first() {
        let detail = event
            .error
            .as_deref()
            .or(event.note.as_deref())
            .unwrap_or("");
        println!("Last attempt:          {} {:?} {}", event.at, event.status, detail);
    }
    if !summary.adapters.is_empty() {
        println!("Adapters:              {}", summary.adapters.join(", "));
    }

    if !summary.open_conflicts.is_empty() {
        println!();
        println!("Open conflicts:");
        for conflict in &summary.open_conflicts {
            println!(
                "  {} {}: local {} / remote {}",
                conflict.kind, conflict.id, conflict.local_path, conflict.remote_copy_path
            );
        }
        println!("Edit the local file to the version you want, then run `ctxvault push`.");
    }

    if !summary.recent_entries.is_empty() {
        println!();
        println!("Recently updated:");
        for entry in &summary.recent_entries {
            println!("  [{}] {} r{} {}", entry.kind, entry.id, entry.revision, entry.title);
        }
    }

    Ok(())
}
