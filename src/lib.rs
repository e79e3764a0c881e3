//! OneNote MCP Server Library
//!
//! A Model Context Protocol (MCP) server for Microsoft OneNote, speaking
//! JSON-RPC 2.0 over stdio. Exposes tools for browsing the notebook
//! hierarchy (notebooks → sections → pages) and fetching page content via
//! the Microsoft Graph API.
//!
//! # Authentication
//!
//! Uses the OAuth2 device-code grant: the assistant relays a verification
//! URL and short code to the user, who signs in on any browser. Tokens are
//! cached under `~/.onenote-mcp/` (owner read/write only) and refreshed
//! silently when possible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod protocol;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging.
///
/// Everything goes to stderr: stdout carries the MCP protocol.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
