//! Error types for the OneNote MCP server

use std::io;

use thiserror::Error;

/// Result type alias for the OneNote MCP server
pub type Result<T> = std::result::Result<T, Error>;

/// OneNote MCP server errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing client ID, bad environment)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No usable access token; the caller must run the device-code flow
    #[error("Not authenticated. Run 'start_authentication' and 'complete_authentication' first")]
    NotAuthenticated,

    /// Device-code flow rejected, expired, or denied
    #[error("Authentication flow failed: {0}")]
    AuthFlow(String),

    /// Non-2xx response from Microsoft Graph, body preserved verbatim
    #[error("Graph API error: {status} - {body}")]
    RemoteApi {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// HTTP method the gateway does not support
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Malformed JSON-RPC traffic
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::Json(_) => -32700,     // Parse error
            Self::Protocol(_) => -32600, // Invalid request
            Self::UnsupportedMethod(_) => -32602,
            _ => -32603, // Internal error
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
}
