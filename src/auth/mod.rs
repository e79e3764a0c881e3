//! OAuth2 authentication for Microsoft Graph
//!
//! Implements the device-code grant against the Microsoft identity
//! platform, with silent refresh and on-disk token caching.
//!
//! Features:
//! - Device authorization grant (user signs in on a second device)
//! - Token persistence across server restarts (owner-only file)
//! - Silent refresh via the stored refresh token
//! - Single owner of all credential state (`AuthManager`)

mod device;
mod manager;
mod tokens;

pub use device::{DeviceCodeResponse, PendingFlow, TokenErrorResponse, TokenResponse};
pub use manager::{AuthManager, AuthStatus};
pub use tokens::{EXPIRY_MARGIN_SECS, TokenCache, TokenSet, now_secs};
