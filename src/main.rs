mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ctxvault::config::CtxConfig;
use ctxvault::store::types::EntryKind;
use ctxvault::sync::SyncMode;

#[derive(Parser)]
#[command(name = "ctxvault", version, about = "Git-backed shared context store for AI coding agents")]
struct Cli {
    /// Store directory (overrides config and CTXVAULT_ROOT)
    #[arg(long, global = true)]
    root: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the store, its git repository, and the remote
    Init {
        /// Project name recorded in the manifest (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
        /// Remote URL (defaults to the enclosing project's origin)
        #[arg(long)]
        remote: Option<String>,
    },
    /// Show counts, sync state, and open conflicts
    Status,
    /// List entries of one kind
    List {
        /// knowledge, decision, or skill
        kind: EntryKind,
    },
    /// Show one entry
    Get {
        kind: EntryKind,
        id: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keyword search across all entries
    Search {
        query: String,
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// Commit, merge remote changes, and publish
    Push,
    /// Commit and merge remote changes without publishing
    Pull,
    /// Start the MCP server
    Serve {
        /// Transport: stdio or http (defaults to config)
        #[arg(long)]
        transport: Option<String>,
    },
    /// Check store health
    Doctor,
    /// Rebuild the search index from the documents on disk
    Reindex,
    /// Write MCP client configs for agent tools
    Register {
        /// Tool names: claude, cursor, vscode, windsurf
        tools: Vec<String>,
        /// Also register every tool detected in the project
        #[arg(long)]
        detect: bool,
    },
    /// Dump the manifest and all entries as JSON
    Export,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CtxConfig::load()?;
    if let Some(root) = cli.root {
        config.store.root = root;
    }

    // Initialize tracing with the configured log level.
    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Init { name, remote } => {
            cli::init::init(&config, name.as_deref(), remote.as_deref())?;
        }
        Command::Status => cli::status::status(&config)?,
        Command::List { kind } => cli::list::list(&config, kind)?,
        Command::Get { kind, id, json } => cli::get::get(&config, kind, &id, json)?,
        Command::Search { query, limit } => cli::search::search(&config, &query, limit)?,
        Command::Push => cli::sync::sync(&config, SyncMode::Push).await?,
        Command::Pull => cli::sync::sync(&config, SyncMode::Pull).await?,
        Command::Serve { transport } => {
            let transport = transport.unwrap_or_else(|| config.server.transport.clone());
            match transport.as_str() {
                "stdio" => server::serve_stdio(config).await?,
                "http" | "sse" => server::serve_http(config).await?,
                other => anyhow::bail!("unknown transport: {other} (expected stdio or http)"),
            }
        }
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Reindex => cli::reindex::reindex(&config)?,
        Command::Register { tools, detect } => cli::register::register(&config, &tools, detect)?,
        Command::Export => cli::export::export(&config)?,
    }

    Ok(())
}
