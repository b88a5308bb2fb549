//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! Both entry points open the engine, start the background sweep when it is
//! enabled, serve until the client disconnects (stdio) or ctrl-c (HTTP), then
//! stop the sweep before returning.

use crate::config::StrataConfig;
use crate::engine::MemoryEngine;
use crate::scheduler::SweepScheduler;
use crate::tools::StrataTools;
use anyhow::{Context, Result};
use rmcp::ServiceExt;
use std::time::Duration;

fn start_scheduler(engine: &MemoryEngine) -> Option<SweepScheduler> {
    let scheduler = &engine.config().scheduler;
    if !scheduler.enabled {
        tracing::info!("background sweep disabled");
        return None;
    }
    Some(SweepScheduler::spawn(
        engine.clone(),
        Duration::from_secs(scheduler.interval_secs),
    ))
}

async fn stop_scheduler(scheduler: Option<SweepScheduler>) {
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: StrataConfig) -> Result<()> {
    tracing::info!("starting Strata MCP server on stdio");

    let engine = MemoryEngine::open(config)?;
    let scheduler = start_scheduler(&engine);

    let tools = StrataTools::new(engine);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    let outcome = server.waiting().await;
    stop_scheduler(scheduler).await;
    outcome?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP, mounted at `/mcp`.
pub async fn serve_http(config: StrataConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting Strata MCP server on HTTP");

    let engine = MemoryEngine::open(config)?;
    let scheduler = start_scheduler(&engine);

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(StrataTools::new(engine.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await;

    stop_scheduler(scheduler).await;
    served?;
    Ok(())
}
