use anyhow::Result;

use ctxvault::config::CtxConfig;
use ctxvault::store::types::EntryKind;

/// List every entry of one kind.
pub fn list(config: &CtxConfig, kind: EntryKind) -> Result<()> {
    let store = super::open_store(config)?;
    let entries = store.list(kind)?;

    if entries.is_empty() {
        println!("No {} entries.", kind);
        return Ok(());
    }

    for entry in &entries {
        println!(
            "  {:<24} r{:<4} {}  {}",
            entry.id,
            entry.revision,
            entry.updated_at.format("%Y-%m-%d %H:%M"),
            entry.title(),
        );
    }
    println!();
    println!("{} {} entr{}.", entries.len(), kind, if entries.len() == 1 { "y" } else { "ies" });
    Ok(())
}
