//! OAuth2 device-code grant wire types
//!
//! Shapes match the Microsoft identity platform v2.0 endpoints
//! (`/oauth2/v2.0/devicecode` and `/oauth2/v2.0/token`).

use serde::Deserialize;

use super::tokens::now_secs;

/// Response from the device authorization endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    /// Opaque continuation handle polled against the token endpoint
    pub device_code: String,
    /// Short code the user types at the verification URL
    pub user_code: String,
    /// URL the user visits on a secondary device/browser
    pub verification_uri: String,
    /// Lifetime of this flow, seconds
    pub expires_in: u64,
    /// Minimum polling period, seconds
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Provider-supplied human-readable instructions
    #[serde(default)]
    pub message: Option<String>,
}

fn default_interval() -> u64 {
    5
}

/// The at-most-one in-flight device-code exchange. Never persisted.
#[derive(Debug, Clone)]
pub struct PendingFlow {
    /// Continuation handle for polling
    pub device_code: String,
    /// User-facing verification URL
    pub verification_uri: String,
    /// User-facing code
    pub user_code: String,
    /// Poll period, seconds
    pub interval: u64,
    /// Absolute instant the flow itself dies (Unix seconds)
    pub expires_at: u64,
}

impl PendingFlow {
    /// Build a pending flow from the provider response.
    #[must_use]
    pub fn from_response(resp: &DeviceCodeResponse) -> Self {
        Self {
            device_code: resp.device_code.clone(),
            verification_uri: resp.verification_uri.clone(),
            user_code: resp.user_code.clone(),
            interval: resp.interval,
            expires_at: now_secs() + resp.expires_in,
        }
    }

    /// Whether the flow's own lifetime has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        now_secs() >= self.expires_at
    }

    /// Remaining flow lifetime in seconds.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        self.expires_at.saturating_sub(now_secs())
    }
}

/// Success body from the token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// Bearer access token
    pub access_token: String,
    /// Refresh token (present when `offline_access` was granted)
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token, seconds
    pub expires_in: u64,
}

/// OAuth error body from the token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenErrorResponse {
    /// Machine-readable error code
    pub error: String,
    /// Human-readable description
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    /// The user has not finished the out-of-band step yet; keep polling.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.error == "authorization_pending"
    }

    /// The provider asked us to back off; keep polling at a longer period.
    #[must_use]
    pub fn is_slow_down(&self) -> bool {
        self.error == "slow_down"
    }

    /// Terminal outcome: denied, expired, or a bad code. The flow cannot
    /// be completed and must be restarted.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.error.as_str(),
            "authorization_declined" | "expired_token" | "bad_verification_code"
        )
    }

    /// Best-available description for error reporting.
    #[must_use]
    pub fn describe(&self) -> String {
        self.error_description
            .clone()
            .unwrap_or_else(|| self.error.clone())
    }
}
