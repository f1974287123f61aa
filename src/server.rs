//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that wire up the
//! context store, the git sync engine, and the MCP tool handler into a running
//! server.

use crate::cli;
use crate::tools::CtxTools;
use anyhow::Result;
use ctxvault::config::CtxConfig;
use ctxvault::store::ContextStore;
use ctxvault::sync::SyncEngine;
use rmcp::ServiceExt;
use std::sync::Arc;

/// Shared setup: open the store (with recovery) and build the sync engine.
fn setup_shared_state(
    config: CtxConfig,
) -> Result<(Arc<ContextStore>, Arc<SyncEngine>, Arc<CtxConfig>)> {
    let store = cli::open_store(&config)?;
    tracing::info!(root = %store.root().display(), "context store ready");

    let manifest = store.manifest()?;
    if manifest.adapters.is_empty() {
        tracing::debug!("no agent adapters registered yet");
    }

    let engine = cli::git_engine(&config, store.root())?;
    tracing::info!(branch = %config.sync.branch, remote = %config.sync.remote, "sync engine ready");

    Ok((Arc::new(store), Arc::new(engine), Arc::new(config)))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: CtxConfig) -> Result<()> {
    tracing::info!("starting ctxvault MCP server on stdio");

    let (store, engine, config) = setup_shared_state(config)?;

    let tools = CtxTools::new(store, engine, config);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over streamable HTTP.
pub async fn serve_http(config: CtxConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let bind_addr = format!("{host}:{port}");

    tracing::info!(addr = %bind_addr, "starting ctxvault MCP server on HTTP");

    let (store, engine, config) = setup_shared_state(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(CtxTools::new(store.clone(), engine.clone(), config.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
