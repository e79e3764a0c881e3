//! Token state and disk persistence
//!
//! Persists the cached token set to disk so authentication survives server
//! restarts. The cache is a single JSON file holding a single record; it is
//! replaced on every token change and deleted wholesale on cache-clear.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Safety margin subtracted from the server-reported lifetime so a token is
/// never used mid-flight while it expires (seconds).
pub const EXPIRY_MARGIN_SECS: u64 = 300;

/// Current Unix time in seconds.
#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Cached OAuth token set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Opaque bearer access token
    pub access_token: String,

    /// Refresh token (optional; issued when `offline_access` was granted)
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Unix timestamp after which the access token must not be used.
    /// Already includes the safety margin.
    pub expires_at: u64,
}

impl TokenSet {
    /// Build a token set from a token-endpoint response, applying the
    /// safety margin to the reported lifetime.
    #[must_use]
    pub fn from_response(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: u64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: now_secs() + expires_in.saturating_sub(EXPIRY_MARGIN_SECS),
        }
    }

    /// The token is valid iff the current instant is strictly before
    /// `expires_at`.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        now_secs() >= self.expires_at
    }

    /// Remaining validity in seconds (0 when expired).
    #[must_use]
    pub fn valid_for(&self) -> u64 {
        self.expires_at.saturating_sub(now_secs())
    }
}

/// Disk persistence for the token set.
///
/// I/O failures here are warnings, not errors: a broken disk never blocks
/// using an in-memory token. Two processes sharing the cache file race
/// last-writer-wins; acceptable for the single-user intended use.
pub struct TokenCache {
    path: PathBuf,
    enabled: bool,
}

impl TokenCache {
    /// Create a token cache at the given file path.
    #[must_use]
    pub fn new(path: PathBuf, enabled: bool) -> Self {
        Self { path, enabled }
    }

    /// Whether persistence is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the cache file currently exists on disk.
    #[must_use]
    pub fn file_present(&self) -> bool {
        self.path.exists()
    }

    /// Load the persisted token record. Returns `None` when caching is
    /// disabled, the file is missing, or the file cannot be parsed.
    pub fn load(&self) -> Option<TokenSet> {
        if !self.enabled {
            return None;
        }

        if !self.path.exists() {
            debug!("No token cache file found");
            return None;
        }

        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<TokenSet>(&content) {
                Ok(tokens) => {
                    if tokens.is_expired() {
                        debug!("Cached token is expired");
                    } else {
                        info!(valid_for = tokens.valid_for(), "Loaded cached token");
                    }
                    // Expired tokens are still returned; the refresh token
                    // inside may be usable.
                    Some(tokens)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse token cache file");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to read token cache file");
                None
            }
        }
    }

    /// Persist the token record. Failures are logged, never propagated.
    pub fn save(&self, tokens: &TokenSet) {
        if !self.enabled {
            return;
        }

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!(error = %e, "Failed to create token cache directory");
                    return;
                }
            }
        }

        let content = match serde_json::to_string_pretty(tokens) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to serialize token cache");
                return;
            }
        };

        if let Err(e) = fs::write(&self.path, content) {
            warn!(error = %e, "Failed to write token cache file");
            return;
        }

        // Bearer credentials must not be readable by other local accounts.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            if let Err(e) = fs::set_permissions(&self.path, perms) {
                warn!(error = %e, "Failed to restrict token cache permissions");
            }
        }

        info!("Saved token cache");
    }

    /// Delete the cache file. Idempotent; missing file is not an error.
    pub fn delete(&self) {
        if self.path.exists() {
            match fs::remove_file(&self.path) {
                Ok(()) => info!("Deleted token cache"),
                Err(e) => warn!(error = %e, "Failed to delete token cache file"),
            }
        }
    }
}
