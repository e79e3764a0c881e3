//! Token lifecycle manager
//!
//! `AuthManager` is the single owner of credential state: the cached token
//! set, the at-most-one pending device-code flow, and the disk cache. The
//! Graph gateway never touches tokens except through `ensure_valid_token`
//! and `access_token`.
//!
//! Locks are plain `parking_lot` primitives and are never held across an
//! await; state is cloned or taken out before any network suspension.

use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::device::{DeviceCodeResponse, PendingFlow, TokenErrorResponse, TokenResponse};
use super::tokens::{TokenCache, TokenSet};
use crate::config::Config;
use crate::graph::UserProfile;
use crate::{Error, Result};

/// Grant type identifier for device-code token polling (RFC 8628)
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Snapshot returned by [`AuthManager::status`]
#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    /// Whether a usable token exists (after any silent refresh)
    pub authenticated: bool,
    /// Remaining access-token validity, seconds (0 when unauthenticated)
    pub valid_for_seconds: u64,
    /// Whether disk persistence is enabled
    pub cache_enabled: bool,
    /// Whether the cache file exists on disk
    pub cache_file_present: bool,
}

/// Owns credential state and drives the device-code flow.
pub struct AuthManager {
    http_client: Client,
    config: Config,
    cache: TokenCache,
    tokens: RwLock<Option<TokenSet>>,
    pending_flow: Mutex<Option<PendingFlow>>,
}

impl AuthManager {
    /// Create a manager for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the cache path cannot be determined.
    pub fn new(http_client: Client, config: Config) -> Result<Self> {
        let cache = TokenCache::new(config.cache_path()?, config.onenote_token_cache);
        Ok(Self {
            http_client,
            config,
            cache,
            tokens: RwLock::new(None),
            pending_flow: Mutex::new(None),
        })
    }

    /// The single gate every outbound Graph call passes through.
    ///
    /// Loads the disk cache on first use, accepts an unexpired in-memory
    /// token as-is, otherwise attempts a silent refresh. Expected failures
    /// never surface as errors; the boolean is the whole answer.
    pub async fn ensure_valid_token(&self) -> bool {
        // First use: hydrate from disk (no-op when caching is disabled)
        if self.tokens.read().is_none() {
            if let Some(tokens) = self.cache.load() {
                *self.tokens.write() = Some(tokens);
            }
        }

        {
            let tokens = self.tokens.read();
            if let Some(t) = tokens.as_ref() {
                if !t.is_expired() {
                    return true;
                }
            }
        }

        // Expired or absent: try a silent refresh
        let refresh_token = {
            let tokens = self.tokens.read();
            tokens.as_ref().and_then(|t| t.refresh_token.clone())
        };

        if let Some(refresh_token) = refresh_token {
            match self.refresh(&refresh_token).await {
                Ok(()) => return true,
                Err(e) => debug!(error = %e, "Silent refresh unavailable"),
            }
        }

        // Nothing usable now. Only the dead access token becomes
        // unreachable (via `access_token`); a refresh token stays in
        // memory so the next call can retry after a transient provider
        // failure. The persisted file is left untouched.
        {
            let mut tokens = self.tokens.write();
            if tokens.as_ref().is_some_and(|t| t.refresh_token.is_none()) {
                *tokens = None;
            }
        }
        false
    }

    /// Current bearer token, if unexpired. Callers must gate on
    /// [`ensure_valid_token`](Self::ensure_valid_token) first.
    pub fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .as_ref()
            .filter(|t| !t.is_expired())
            .map(|t| t.access_token.clone())
    }

    /// Begin a device-code flow. Any prior pending flow is discarded.
    ///
    /// # Errors
    ///
    /// `Error::Config` when no client ID is configured, `Error::AuthFlow`
    /// when the identity provider rejects the request.
    pub async fn start_device_flow(&self) -> Result<PendingFlow> {
        self.config.validate()?;

        let scope = self.config.scope_string();
        let params = [
            ("client_id", self.config.azure_client_id.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http_client
            .post(self.config.device_code_endpoint())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthFlow(format!(
                "Failed to create device flow: HTTP {status} - {body}"
            )));
        }

        let device_response: DeviceCodeResponse = response.json().await?;
        let flow = PendingFlow::from_response(&device_response);

        info!(
            verification_uri = %flow.verification_uri,
            user_code = %flow.user_code,
            "Device flow started"
        );

        // At most one flow in flight: replace, never merge
        *self.pending_flow.lock() = Some(flow.clone());

        Ok(flow)
    }

    /// Complete the pending device-code flow: poll the token endpoint
    /// until the user finishes the out-of-band step, install the tokens,
    /// then verify them with one `/me` probe.
    ///
    /// The pending flow is consumed on entry; success or failure, it is
    /// gone afterwards and a new flow must be started to retry.
    ///
    /// # Errors
    ///
    /// `Error::AuthFlow` when no flow is pending, the user declined, or
    /// the flow expired; `Error::RemoteApi`/`Error::Http` when the token
    /// was issued but the verification probe failed (the token is kept).
    pub async fn complete_device_flow(&self) -> Result<UserProfile> {
        let flow = self.pending_flow.lock().take().ok_or_else(|| {
            Error::AuthFlow(
                "No authentication flow in progress. Call 'start_authentication' first"
                    .to_string(),
            )
        })?;

        let token_response = self.poll_for_token(&flow).await?;
        self.install(token_response);
        info!("Authentication successful");

        self.probe_profile().await
    }

    /// Reset credential state and delete the persisted record. Idempotent.
    pub fn clear(&self) {
        *self.tokens.write() = None;
        *self.pending_flow.lock() = None;
        self.cache.delete();
        info!("Cleared cached tokens");
    }

    /// Read-only snapshot of authentication state. Runs
    /// [`ensure_valid_token`](Self::ensure_valid_token), so a silent
    /// refresh may happen as a side effect; nothing else is mutated.
    pub async fn status(&self) -> AuthStatus {
        let authenticated = self.ensure_valid_token().await;
        let valid_for_seconds = self
            .tokens
            .read()
            .as_ref()
            .map_or(0, TokenSet::valid_for);

        AuthStatus {
            authenticated,
            valid_for_seconds,
            cache_enabled: self.cache.enabled(),
            cache_file_present: self.cache.file_present(),
        }
    }

    /// Whether a device flow is currently pending (diagnostics only).
    pub fn has_pending_flow(&self) -> bool {
        self.pending_flow.lock().is_some()
    }

    /// Poll the token endpoint at the provider interval until a terminal
    /// outcome. The flow's own expiry is enforced client-side so a dead
    /// flow cannot hang the caller past its lifetime.
    async fn poll_for_token(&self, flow: &PendingFlow) -> Result<TokenResponse> {
        let mut interval = flow.interval;

        loop {
            if flow.is_expired() {
                return Err(Error::AuthFlow(
                    "Device flow expired before the user completed sign-in".to_string(),
                ));
            }

            tokio::time::sleep(Duration::from_secs(interval)).await;

            let params = [
                ("client_id", self.config.azure_client_id.as_str()),
                ("grant_type", DEVICE_CODE_GRANT),
                ("device_code", flow.device_code.as_str()),
            ];

            let response = self
                .http_client
                .post(self.config.token_endpoint())
                .form(&params)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response.json().await?);
            }

            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) if err.is_pending() => {
                    debug!("Authorization pending, polling again");
                }
                Ok(err) if err.is_slow_down() => {
                    interval += 5;
                    debug!(interval, "Provider asked to slow down");
                }
                Ok(err) => {
                    return Err(Error::AuthFlow(err.describe()));
                }
                Err(_) => {
                    return Err(Error::AuthFlow(format!(
                        "Token request failed: HTTP {} - {body}",
                        status.as_u16()
                    )));
                }
            }
        }
    }

    /// Refresh the access token with a `refresh_token` grant, then update
    /// credential state and the disk cache.
    async fn refresh(&self, refresh_token: &str) -> Result<()> {
        let scope = self.config.scope_string();
        let params = [
            ("client_id", self.config.azure_client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http_client
            .post(self.config.token_endpoint())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthFlow(format!(
                "Token refresh failed: HTTP {status} - {body}"
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        self.install(token_response);
        info!("Token refreshed");
        Ok(())
    }

    /// Install a token-endpoint response as the new credential state.
    /// When the provider rotates nothing, the previous refresh token is
    /// carried forward. Persistence failures are logged inside the cache
    /// and never block the in-memory update.
    fn install(&self, response: TokenResponse) {
        let previous_refresh = {
            let tokens = self.tokens.read();
            tokens.as_ref().and_then(|t| t.refresh_token.clone())
        };

        let tokens = TokenSet::from_response(
            response.access_token,
            response.refresh_token.or(previous_refresh),
            response.expires_in,
        );

        self.cache.save(&tokens);
        *self.tokens.write() = Some(tokens);
    }

    /// One verification call against `/me` to confirm the freshly issued
    /// token actually works.
    async fn probe_profile(&self) -> Result<UserProfile> {
        let token = self.access_token().ok_or(Error::NotAuthenticated)?;

        let response = self
            .http_client
            .get(format!("{}/me", self.config.graph_base_url))
            .bearer_auth(&token)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Token issued but profile probe failed");
            return Err(Error::RemoteApi {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = response.json().await?;
        Ok(UserProfile::from_me_response(&value))
    }

    #[cfg(test)]
    pub(crate) fn inject_tokens(&self, tokens: Option<TokenSet>) {
        *self.tokens.write() = tokens;
    }
}
