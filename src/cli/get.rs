//! CLI `get` command: display one entry in full.

use anyhow::Result;

use ctxvault::config::CtxConfig;
use ctxvault::store::document;
use ctxvault::store::types::EntryKind;

/// Print one entry, as stored or as JSON.
pub fn get(config: &CtxConfig, kind: EntryKind, id: &str, json: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let entry = store.read(kind, id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    println!("{}: {}", entry.kind, entry.id);
    println!("{}", "=".repeat(50));
    println!("  Title:          {}", entry.title());
    println!("  Revision:       {}", entry.revision);
    println!("  Created:        {}", entry.created_at);
    println!("  Updated:        {}", entry.updated_at);
    println!("  Digest:         {}", document::digest(&entry));
    println!();
    print!("{}", document::encode(&entry));
    Ok(())
}
