pub mod doctor;
pub mod export;
pub mod get;
pub mod init;
pub mod list;
pub mod register;
pub mod reindex;
pub mod search;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use ctxvault::config::CtxConfig;
use ctxvault::store::ContextStore;
use ctxvault::sync::SyncEngine;
use ctxvault::vcs::git::GitCli;

/// Open the configured store, running crash recovery if needed.
pub fn open_store(config: &CtxConfig) -> Result<ContextStore> {
    let root = config.resolved_root();
    let store = ContextStore::open(&root, config.store_options())
        .with_context(|| format!("failed to open context store at {}", root.display()))?;
    if let Some(report) = store.recovery() {
        eprintln!(
            "Recovered from an interrupted run: {} entries checked, {} unparsable.",
            report.entries_checked,
            report.unparsable.len()
        );
    }
    Ok(store)
}

/// Git handle for the store root, built from the `[sync]` config section.
pub fn git(config: &CtxConfig, root: &Path) -> GitCli {
    let git = GitCli::new(root, &config.sync.branch, &config.sync.remote)
        .with_timeout(config.network_timeout());
    match (&config.sync.author_name, &config.sync.author_email) {
        (Some(name), Some(email)) => git.with_author(name, email),
        _ => git,
    }
}

/// Sync engine over git, making sure the repository exists first.
pub fn git_engine(config: &CtxConfig, root: &Path) -> Result<SyncEngine> {
    anyhow::ensure!(
        GitCli::is_available(),
        "`git` was not found on PATH; it is required for sync"
    );
    let git = git(config, root);
    git.init().context("failed to prepare context repository")?;
    Ok(SyncEngine::new(Box::new(git)))
}

/// Directory the store lives in, used for project-level files such as agent
/// configs.
pub fn project_dir(config: &CtxConfig) -> Result<PathBuf> {
    let root = config.resolved_root();
    let absolute = if root.is_absolute() {
        root
    } else {
        std::env::current_dir()
            .context("failed to read current directory")?
            .join(root)
    };
    Ok(absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(absolute))
}

/// First `max` characters of `text` on one line.
pub fn preview(text: &str, max: usize) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
