//! CLI `doctor` command: run store diagnostics and print a health report.

use anyhow::{Context, Result};

use ctxvault::config::CtxConfig;
use ctxvault::lock::{self, LockState};
use ctxvault::manifest::Manifest;
use ctxvault::sync::conflicts;
use ctxvault::vcs::git::GitCli;
use ctxvault::vcs::VersionControl;

/// Run store diagnostics and print a health report.
pub fn doctor(config: &CtxConfig) -> Result<()> {
    let root = config.resolved_root();

    println!("ctxvault Health Report");
    println!("======================");
    println!();
    println!("Store root:        {}", root.display());

    // A broken manifest blocks everything else; report it before opening.
    let manifest = match Manifest::load(&root) {
        Ok(m) => m,
        Err(e) => {
            println!("Manifest:          FAILED ({e})");
            println!();
            println!("Recovery steps:");
            println!("  1. Restore manifest.json from git: git -C {} checkout -- manifest.json", root.display());
            println!("  2. Or run `ctxvault init` if this project has no store yet.");
            return Ok(());
        }
    };
    println!("Manifest:          OK (schema v{})", manifest.schema_version);
    println!("Project:           {}", manifest.project_name);

    let lock_state = lock::inspect(&root).context("failed to inspect store lock")?;
    match &lock_state {
        LockState::Free => println!("Lock:              free"),
        LockState::Held(Some(info)) => println!(
            "Lock:              held by pid {} (lease until {})",
            info.pid, info.lease_expires_at
        ),
        LockState::Held(None) => println!("Lock:              held"),
        LockState::Stale(info) => println!(
            "Lock:              stale{} (cleared on next open)",
            info.as_ref()
                .map(|i| format!(", pid {}", i.pid))
                .unwrap_or_default()
        ),
    }

    let store = super::open_store(config)?;
    let report = store.check_consistency()?;
    let indexed = store.indexed_count()?;
    println!();
    println!("Entries:");
    println!("  Documents:       {}", report.entries_checked);
    println!("  Indexed:         {indexed}");
    println!("  Unparsable:      {}", report.unparsable.len());
    for bad in &report.unparsable {
        println!("    {}: {}", bad.path, bad.error);
    }
    println!(
        "  ADR counter:     next {} (highest on disk: {})",
        report.decision_counter,
        report
            .highest_decision
            .map(|n| n.to_string())
            .unwrap_or_else(|| "none".into())
    );
    if report.counter_behind() {
        println!("  WARNING: counter behind existing records; new decisions still skip past them.");
    }

    println!();
    let open_conflicts = conflicts::load(&root);
    match &open_conflicts {
        Ok(open) => {
            println!("Open conflicts:    {}", open.len());
            for record in open.iter() {
                let report = record.report();
                println!("  {} {} -> {}", report.kind, report.local_path, report.remote_copy_path);
            }
        }
        Err(e) => println!("Open conflicts:    unreadable ({e}); sync is blocked until it is repaired"),
    }

    println!();
    if GitCli::is_available() {
        let git = super::git(config, &root);
        println!("git:               available");
        println!("Branch:            {}", git.branch());
        match git.remote_url() {
            Ok(Some(url)) => println!("Remote:            {} -> {url}", config.sync.remote),
            Ok(None) => println!("Remote:            (none)"),
            Err(e) => println!("Remote:            error ({e})"),
        }
        match git.head() {
            Ok(Some(head)) => println!("Head:              {}", head.short()),
            Ok(None) => println!("Head:              (no commits yet)"),
            Err(e) => println!("Head:              error ({e})"),
        }
    } else {
        println!("git:               NOT FOUND (sync disabled)");
    }

    let index_in_step = indexed as usize == report.entries_checked - report.unparsable.len();
    let healthy = report.is_clean() && open_conflicts.as_ref().is_ok_and(|o| o.is_empty()) && index_in_step;
    println!();
    println!("Overall:           {}", if healthy { "OK" } else { "needs attention" });
    if !index_in_step {
        println!("  Index out of step with documents: run `ctxvault reindex`.");
    }

    Ok(())
}
