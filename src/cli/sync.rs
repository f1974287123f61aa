//! CLI `push` / `pull` commands.

use anyhow::{Context, Result};
use std::sync::Arc;

use ctxvault::config::CtxConfig;
use ctxvault::error::StoreError;
use ctxvault::sync::{CancelFlag, SyncMode, SyncOutcome};

/// Run one sync attempt. Ctrl-C stops it at the next phase boundary.
pub async fn sync(config: &CtxConfig, mode: SyncMode) -> Result<()> {
    let store = super::open_store(config)?;
    let engine = super::git_engine(config, store.root())?;

    let cancel = CancelFlag::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling after the current step...");
                cancel.cancel();
            }
        })
    };

    let store = Arc::new(store);
    let result = tokio::task::spawn_blocking({
        let store = Arc::clone(&store);
        move || engine.run(&store, mode, &cancel)
    })
    .await
    .context("sync task failed")?;
    watcher.abort();

    match result {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(StoreError::ConflictUnresolved { conflicts }) => {
            println!("Sync stopped: {} conflict(s) need attention.", conflicts.len());
            println!();
            for c in &conflicts {
                println!("  {} {}", c.kind, c.id);
                println!("    yours:  {}", store.root().join(&c.local_path).display());
                println!("    theirs: {}", store.root().join(&c.remote_copy_path).display());
            }
            println!();
            println!("Edit each local file to the version you want, then run `ctxvault push` again.");
            anyhow::bail!("sync has unresolved conflicts")
        }
        Err(e) if e.is_retryable() => Err(e).context("sync did not complete; nothing was lost, try again"),
        Err(e) => Err(e).context("sync failed"),
    }
}

fn print_outcome(outcome: &SyncOutcome) {
    if outcome.is_noop() {
        println!("Already up to date.");
    }
    if let Some(commit) = &outcome.committed {
        println!("Committed local changes:  {}", short(commit));
    }
    if outcome.fast_forwarded {
        println!("Fast-forwarded to remote.");
    }
    if let Some(merge) = &outcome.merged {
        println!("Merged remote changes:    {}", short(merge));
    }
    if !outcome.applied_paths.is_empty() {
        println!("Updated from remote:");
        for path in &outcome.applied_paths {
            println!("  {path}");
        }
    }
    for path in &outcome.resolved {
        println!("Resolved conflict:        {path} (kept local)");
    }
    if outcome.pushed {
        println!("Pushed.");
    }
    if let Some(note) = &outcome.note {
        println!("Note: {note}");
    }
}

fn short(commit: &str) -> &str {
    &commit[..commit.len().min(12)]
}
