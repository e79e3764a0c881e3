//! OneNote MCP Server - Microsoft OneNote over the Model Context Protocol

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use onenote_mcp::{
    auth::AuthManager, cli::Cli, config::Config, graph::GraphClient, server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Missing client identity fails fast, before any tool executes
    let config = match Config::load() {
        Ok(mut config) => {
            if cli.no_token_cache {
                config.onenote_token_cache = false;
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        token_cache = config.onenote_token_cache,
        "Starting OneNote MCP server"
    );

    let http_client = reqwest::Client::new();

    let auth = match AuthManager::new(http_client.clone(), config.clone()) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Failed to create auth manager: {e}");
            return ExitCode::FAILURE;
        }
    };

    let graph = Arc::new(GraphClient::new(
        http_client,
        Arc::clone(&auth),
        config.graph_base_url.clone(),
    ));

    let server = Server::new(auth, graph);
    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}
