//! CLI `init` command: create the store and its git repository.

use anyhow::{Context, Result};

use ctxvault::config::CtxConfig;
use ctxvault::store::ContextStore;
use ctxvault::vcs::git::{self, GitCli};

/// Create the store layout, initialize the context repository, and wire up
/// the remote.
///
/// Without `--remote`, the enclosing project's `origin` is reused so the
/// context branch travels with the code.
pub fn init(config: &CtxConfig, name: Option<&str>, remote: Option<&str>) -> Result<()> {
    let root = config.resolved_root();
    let project_dir = super::project_dir(config)?;
    let name = match name {
        Some(name) => name.to_string(),
        None => project_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".into()),
    };

    // 1. Store layout and manifest
    let store = ContextStore::init(&root, &name, config.store_options())
        .with_context(|| format!("failed to initialize store at {}", root.display()))?;
    let manifest = store.manifest()?;
    println!("Context store:     {}", root.display());
    println!("Project:           {}", manifest.project_name);

    // 2. Repository on the context branch
    if !GitCli::is_available() {
        println!("git not found: sync is disabled until it is installed.");
        return Ok(());
    }
    let git = super::git(config, &root);
    git.init().context("failed to initialize context repository")?;
    println!("Branch:            {}", git.branch());

    // 3. Remote
    let url = remote
        .map(str::to_string)
        .or_else(|| git::project_origin_url(&project_dir));
    match url {
        Some(url) => {
            git.set_remote_url(&url).context("failed to configure remote")?;
            println!("Remote:            {} -> {url}", config.sync.remote);
        }
        None => match git.remote_url()? {
            Some(existing) => println!("Remote:            {} -> {existing}", config.sync.remote),
            None => println!("Remote:            (none; changes stay local until one is added)"),
        },
    }

    println!();
    println!("Next: `ctxvault register --detect` to connect your agent tools.");
    Ok(())
}
