//! Configuration management
//!
//! All configuration comes from the environment. `AZURE_CLIENT_ID` is
//! required and checked before any tool executes; everything else has a
//! default.

use std::path::{Path, PathBuf};

use figment::{Figment, providers::Env};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Microsoft Graph API base URL
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Microsoft identity platform authority (common = any tenant)
pub const AUTHORITY: &str = "https://login.microsoftonline.com/common";

/// Scopes requested in the device-code flow. `offline_access` is what makes
/// the identity platform issue a refresh token.
pub const SCOPES: &[&str] = &[
    "https://graph.microsoft.com/Notes.Read",
    "https://graph.microsoft.com/Notes.ReadWrite",
    "https://graph.microsoft.com/User.Read",
    "offline_access",
];

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Azure application (client) ID, from `AZURE_CLIENT_ID`
    pub azure_client_id: String,

    /// Whether tokens are persisted to disk, from `ONENOTE_TOKEN_CACHE`.
    /// Read once at startup; never re-checked.
    pub onenote_token_cache: bool,

    /// Identity platform authority base URL. Overridable for tests.
    pub authority: String,

    /// Graph API base URL. Overridable for tests.
    pub graph_base_url: String,

    /// Directory holding the token cache file. Defaults to
    /// `~/.onenote-mcp`; overridable for tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            azure_client_id: String::new(),
            onenote_token_cache: true,
            authority: AUTHORITY.to_string(),
            graph_base_url: GRAPH_BASE_URL.to_string(),
            cache_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `AZURE_CLIENT_ID` is unset or empty.
    pub fn load() -> Result<Self> {
        // Pick up a .env next to the binary if present; real env wins.
        load_env_file();

        let config: Self = Figment::new()
            .merge(Env::raw().only(&["AZURE_CLIENT_ID", "ONENOTE_TOKEN_CACHE"]))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        if self.azure_client_id.trim().is_empty() {
            return Err(Error::Config(
                "AZURE_CLIENT_ID environment variable not set".to_string(),
            ));
        }
        Ok(())
    }

    /// Device authorization endpoint for the configured authority.
    #[must_use]
    pub fn device_code_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/devicecode", self.authority)
    }

    /// Token endpoint for the configured authority.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }

    /// Space-joined scope string for token requests.
    #[must_use]
    pub fn scope_string(&self) -> String {
        SCOPES.join(" ")
    }

    /// Path of the persisted token record.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the home directory cannot be determined
    /// and no override is set.
    pub fn cache_path(&self) -> Result<PathBuf> {
        let dir = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?
                .join(".onenote-mcp"),
        };
        Ok(dir.join("tokens.json"))
    }
}

/// Load a `.env` file from the working directory if one exists.
/// Existing process environment always takes precedence.
fn load_env_file() {
    let path = Path::new(".env");
    if path.exists() {
        match dotenvy::from_path(path) {
            Ok(()) => tracing::debug!("Loaded .env file"),
            Err(e) => tracing::warn!(error = %e, "Failed to load .env file"),
        }
    }
}
