//! Command-line interface

use clap::Parser;

/// OneNote MCP server - browse Microsoft OneNote over the Model Context Protocol
#[derive(Parser, Debug)]
#[command(name = "onenote-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "ONENOTE_MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "ONENOTE_MCP_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Disable the on-disk token cache for this run
    #[arg(long)]
    pub no_token_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::parse_from(["onenote-mcp"]);
        assert_eq!(cli.log_level, "info");
        assert!(cli.log_format.is_none());
        assert!(!cli.no_token_cache);
    }

    #[test]
    fn no_token_cache_flag_parses() {
        let cli = Cli::parse_from(["onenote-mcp", "--no-token-cache", "--log-level", "debug"]);
        assert!(cli.no_token_cache);
        assert_eq!(cli.log_level, "debug");
    }
}
