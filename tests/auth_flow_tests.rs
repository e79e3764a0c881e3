//! End-to-end token lifecycle tests
//!
//! Drives the device-code flow, silent refresh, and cache behavior against
//! a mocked identity provider and Graph API.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use onenote_mcp::auth::{AuthManager, TokenCache, TokenSet};
use onenote_mcp::config::Config;

fn test_config(mock_uri: &str, cache_dir: &std::path::Path, cache_enabled: bool) -> Config {
    Config {
        azure_client_id: "11111111-2222-3333-4444-555555555555".to_string(),
        onenote_token_cache: cache_enabled,
        authority: format!("{mock_uri}/common"),
        graph_base_url: format!("{mock_uri}/v1.0"),
        cache_dir: Some(cache_dir.to_path_buf()),
    }
}

fn manager(config: Config) -> Arc<AuthManager> {
    Arc::new(AuthManager::new(reqwest::Client::new(), config).unwrap())
}

async fn mount_device_code(server: &MockServer, device_code: &str) {
    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/devicecode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": device_code,
            "user_code": "FJJ2LPDQM",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 900,
            "interval": 0,
            "message": "Enter the code FJJ2LPDQM to authenticate."
        })))
        .mount(server)
        .await;
}

/// Fresh process, no cache file: no valid token, then the full device flow
/// produces one with the expiry margin applied.
#[tokio::test]
async fn device_flow_end_to_end() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = manager(test_config(&server.uri(), dir.path(), true));

    assert!(!auth.ensure_valid_token().await);

    mount_device_code(&server, "dev-code-1").await;

    // First poll: user has not finished signing in yet
    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "authorization_pending",
            "error_description": "User has not yet completed authentication."
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "graph-access-token",
            "refresh_token": "graph-refresh-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "displayName": "Ada Lovelace",
            "mail": "ada@example.com"
        })))
        .mount(&server)
        .await;

    let flow = auth.start_device_flow().await.unwrap();
    assert_eq!(flow.user_code, "FJJ2LPDQM");
    assert_eq!(flow.verification_uri, "https://microsoft.com/devicelogin");
    assert!(flow.expires_in() <= 900);

    let profile = auth.complete_device_flow().await.unwrap();
    assert_eq!(profile.display_name, "Ada Lovelace");
    assert_eq!(profile.email, "ada@example.com");

    assert!(auth.ensure_valid_token().await);
    let status = auth.status().await;
    assert!(status.authenticated);
    // 3600s lifetime minus the 300s margin
    assert!(status.valid_for_seconds <= 3300);
    assert!(status.valid_for_seconds > 3200);
    assert!(status.cache_file_present);
}

/// Starting a second flow invalidates the first: completion polls with the
/// replacement device code, never the original.
#[tokio::test]
async fn second_start_replaces_pending_flow() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = manager(test_config(&server.uri(), dir.path(), true));

    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/devicecode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dev-code-first",
            "user_code": "AAAA",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 900,
            "interval": 0
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_device_code(&server, "dev-code-second").await;

    // The token endpoint only accepts the second flow's handle
    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .and(body_string_contains("dev-code-second"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "displayName": "Ada Lovelace",
            "userPrincipalName": "ada@corp.example.com"
        })))
        .mount(&server)
        .await;

    auth.start_device_flow().await.unwrap();
    auth.start_device_flow().await.unwrap();

    let profile = auth.complete_device_flow().await.unwrap();
    assert_eq!(profile.email, "ada@corp.example.com");
}

/// A declined flow surfaces as an auth-flow error and is consumed: the next
/// completion attempt reports that no flow is pending.
#[tokio::test]
async fn declined_flow_is_terminal_and_consumed() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = manager(test_config(&server.uri(), dir.path(), true));

    mount_device_code(&server, "dev-code-1").await;
    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "authorization_declined",
            "error_description": "The user denied the request."
        })))
        .mount(&server)
        .await;

    auth.start_device_flow().await.unwrap();

    let err = auth.complete_device_flow().await.unwrap_err();
    assert!(err.to_string().contains("denied"));
    assert!(!auth.ensure_valid_token().await);

    let err = auth.complete_device_flow().await.unwrap_err();
    assert!(err.to_string().contains("No authentication flow in progress"));
}

/// Expired cached token with a refresh token: the silent refresh path makes
/// `ensure_valid_token` true and persists the rotated tokens.
#[tokio::test]
async fn silent_refresh_revives_expired_token() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    // Seed a cache file whose access token expired one second ago
    let cache = TokenCache::new(dir.path().join("tokens.json"), true);
    let mut stale = TokenSet::from_response(
        "stale-access".to_string(),
        Some("good-refresh".to_string()),
        3600,
    );
    stale.expires_at = onenote_mcp::auth::now_secs() - 1;
    cache.save(&stale);

    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("good-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "refresh_token": "rotated-refresh",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let auth = manager(test_config(&server.uri(), dir.path(), true));
    assert!(auth.ensure_valid_token().await);

    let status = auth.status().await;
    assert!(status.authenticated);
    assert!(status.valid_for_seconds > 3200);

    // The rotated tokens were persisted
    let persisted = cache.load().unwrap();
    assert_eq!(persisted.access_token, "fresh-access");
    assert_eq!(persisted.refresh_token.as_deref(), Some("rotated-refresh"));
}

/// A failed refresh is "refresh unavailable", not an error: the call
/// returns false and the persisted record is left untouched.
#[tokio::test]
async fn failed_refresh_returns_false_and_keeps_file() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let cache = TokenCache::new(dir.path().join("tokens.json"), true);
    let mut stale = TokenSet::from_response(
        "stale-access".to_string(),
        Some("revoked-refresh".to_string()),
        3600,
    );
    stale.expires_at = onenote_mcp::auth::now_secs() - 1;
    cache.save(&stale);

    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "The refresh token has been revoked."
        })))
        .mount(&server)
        .await;

    let auth = manager(test_config(&server.uri(), dir.path(), true));
    assert!(!auth.ensure_valid_token().await);

    // File untouched on failure
    let persisted = cache.load().unwrap();
    assert_eq!(persisted.access_token, "stale-access");
}

/// A flow whose own lifetime has elapsed fails client-side, before any
/// token poll reaches the provider.
#[tokio::test]
async fn expired_flow_fails_without_polling() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = manager(test_config(&server.uri(), dir.path(), true));

    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/devicecode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dev-code-dead",
            "user_code": "AAAA",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 0,
            "interval": 0
        })))
        .mount(&server)
        .await;
    // The token endpoint must never be hit
    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400))
        .expect(0)
        .mount(&server)
        .await;

    auth.start_device_flow().await.unwrap();

    let err = auth.complete_device_flow().await.unwrap_err();
    assert!(err.to_string().contains("expired"));
    assert!(!auth.ensure_valid_token().await);
}

/// `slow_down` stretches the polling period by five seconds before the
/// next attempt.
#[tokio::test(start_paused = true)]
async fn slow_down_backs_off_polling() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = manager(test_config(&server.uri(), dir.path(), true));

    mount_device_code(&server, "dev-code-1").await;
    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "slow_down",
            "error_description": "Polling too frequently."
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "displayName": "Ada Lovelace",
            "mail": "ada@example.com"
        })))
        .mount(&server)
        .await;

    auth.start_device_flow().await.unwrap();

    let started = tokio::time::Instant::now();
    auth.complete_device_flow().await.unwrap();

    // Base interval 0, plus the 5s penalty before the second poll
    assert!(started.elapsed() >= std::time::Duration::from_secs(5));
    assert!(auth.ensure_valid_token().await);
}

/// With caching disabled a well-formed file on disk is never consulted.
#[tokio::test]
async fn disabled_cache_ignores_disk_state() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let cache = TokenCache::new(dir.path().join("tokens.json"), true);
    cache.save(&TokenSet::from_response(
        "perfectly-valid".to_string(),
        None,
        3600,
    ));

    let auth = manager(test_config(&server.uri(), dir.path(), false));
    assert!(!auth.ensure_valid_token().await);

    let status = auth.status().await;
    assert!(!status.authenticated);
    assert!(!status.cache_enabled);
    assert!(status.cache_file_present);
}

/// clear() removes memory and disk state and is safe to repeat.
#[tokio::test]
async fn clear_removes_tokens_and_file() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let cache = TokenCache::new(dir.path().join("tokens.json"), true);
    cache.save(&TokenSet::from_response("tok".to_string(), None, 3600));

    let auth = manager(test_config(&server.uri(), dir.path(), true));
    assert!(auth.ensure_valid_token().await);

    auth.clear();
    assert!(!dir.path().join("tokens.json").exists());
    assert!(!auth.ensure_valid_token().await);

    auth.clear();
    assert!(!dir.path().join("tokens.json").exists());
}
