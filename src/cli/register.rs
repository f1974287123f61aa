use anyhow::Result;

use ctxvault::adapters::{self, ServerLaunch};
use ctxvault::config::CtxConfig;

/// Write MCP client configs for agent tools and record them in the manifest.
pub fn register(config: &CtxConfig, tools: &[String], detect: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let project_dir = super::project_dir(config)?;

    if tools.is_empty() && !detect {
        println!("Available adapters:");
        for adapter in adapters::all_adapters() {
            let found = if adapter.detect(&project_dir) { " (detected)" } else { "" };
            println!("  {}{found}", adapter.name());
        }
        println!();
        println!("Run `ctxvault register <tool>...` or `ctxvault register --detect`.");
        return Ok(());
    }

    let registrations =
        adapters::register(&store, &project_dir, tools, detect, &ServerLaunch::default())?;
    if registrations.is_empty() {
        println!("No agent tools detected in {}.", project_dir.display());
    }
    for reg in &registrations {
        println!("  {:<10} {}", reg.adapter, reg.config_path.display());
    }
    Ok(())
}
