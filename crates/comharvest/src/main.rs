//! comharvest: COM registration capture and reconstruction MCP server.
//!
//! Loads self-registering modules inside a redirected registry, records what
//! they write, and rebuilds it as typed COM entities. Communicates via stdio
//! transport.

mod capture;
mod classify;
mod config;
mod error;
mod harvest;
mod paths;
mod sandbox;
mod server;

use rmcp::transport::stdio;
use rmcp::ServiceExt;
use server::tools::ComHarvestServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays clean for MCP
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("comharvest MCP server starting...");

    let service = ComHarvestServer::new()
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("Server error: {}", e))?;

    tracing::info!("comharvest MCP server running on stdio");
    service.waiting().await?;

    tracing::info!("comharvest MCP server shutting down");
    Ok(())
}
