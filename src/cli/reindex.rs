//! CLI `reindex` command: rebuild the search index from the documents on disk.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use ctxvault::config::CtxConfig;
use ctxvault::store::types::EntryKind;

/// Re-read every document and rebuild the index from scratch.
pub fn reindex(config: &CtxConfig) -> Result<()> {
    let store = super::open_store(config)?;

    let pb = ProgressBar::new(EntryKind::ALL.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("##-"),
    );

    // Parse every kind up front so a bad document is reported before the
    // index is touched.
    let mut parsed = 0usize;
    for kind in EntryKind::ALL {
        pb.set_message(kind.dir_name());
        parsed += store.list(kind)?.len();
        pb.inc(1);
    }
    pb.finish_and_clear();

    let indexed = store.rebuild_index().context("failed to rebuild search index")?;
    let report = store.check_consistency()?;

    println!("Reindexed {indexed} entries ({parsed} parsed).");
    for bad in &report.unparsable {
        println!("  skipped {}: {}", bad.path, bad.error);
    }
    Ok(())
}
