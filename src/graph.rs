//! Authenticated Microsoft Graph gateway
//!
//! Every OneNote operation funnels through [`GraphClient::call`] (or
//! [`GraphClient::get_text`] for page markup). Both validate the token via
//! the auth manager before any network I/O; there is no path that attaches
//! a bearer token without passing that gate.

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::auth::AuthManager;
use crate::{Error, Result};

/// Notebook listing entry
#[derive(Debug, Clone, Serialize)]
pub struct NotebookSummary {
    /// Graph notebook ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Creation timestamp (ISO 8601, as reported by Graph)
    pub created: Option<String>,
    /// Last-modified timestamp
    pub modified: Option<String>,
}

/// Section listing entry
#[derive(Debug, Clone, Serialize)]
pub struct SectionSummary {
    /// Graph section ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Creation timestamp
    pub created: Option<String>,
    /// Last-modified timestamp
    pub modified: Option<String>,
}

/// Page listing entry
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    /// Graph page ID
    pub id: String,
    /// Page title
    pub title: String,
    /// Creation timestamp
    pub created: Option<String>,
    /// Last-modified timestamp
    pub modified: Option<String>,
    /// URL of the page content endpoint
    pub content_url: Option<String>,
}

/// Signed-in user profile, from `/me`
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    /// Display name
    pub display_name: String,
    /// Email address (`mail`, falling back to `userPrincipalName`)
    pub email: String,
}

impl UserProfile {
    /// Extract the profile fields from a `/me` response body.
    #[must_use]
    pub fn from_me_response(value: &Value) -> Self {
        let display_name = value
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let email = value
            .get("mail")
            .and_then(Value::as_str)
            .or_else(|| value.get("userPrincipalName").and_then(Value::as_str))
            .unwrap_or("Unknown")
            .to_string();
        Self {
            display_name,
            email,
        }
    }
}

/// Authenticated gateway for Graph API calls.
pub struct GraphClient {
    http_client: Client,
    auth: Arc<AuthManager>,
    base_url: String,
}

impl GraphClient {
    /// Create a gateway over the given auth manager.
    #[must_use]
    pub fn new(http_client: Client, auth: Arc<AuthManager>, base_url: String) -> Self {
        Self {
            http_client,
            auth,
            base_url,
        }
    }

    /// Issue an authenticated Graph request and parse the JSON response.
    ///
    /// # Errors
    ///
    /// `Error::NotAuthenticated` when no usable token exists,
    /// `Error::UnsupportedMethod` for methods other than GET/POST/PATCH
    /// (checked before any network I/O), `Error::RemoteApi` for any
    /// status ≥ 400 with the body preserved verbatim. No retries.
    pub async fn call(
        &self,
        endpoint: &str,
        method: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let response = self.send(endpoint, method, body).await?;
        Ok(response.json().await?)
    }

    /// Issue an authenticated GET and return the raw body text. Used for
    /// page content, which is HTML rather than structured data.
    pub async fn get_text(&self, endpoint: &str) -> Result<String> {
        let response = self.send(endpoint, "GET", None).await?;
        Ok(response.text().await?)
    }

    async fn send(
        &self,
        endpoint: &str,
        method: &str,
        body: Option<Value>,
    ) -> Result<reqwest::Response> {
        // Must be rejected before any network I/O, including the token
        // refresh inside ensure_valid_token.
        let method = match method {
            "GET" => reqwest::Method::GET,
            "POST" => reqwest::Method::POST,
            "PATCH" => reqwest::Method::PATCH,
            other => return Err(Error::UnsupportedMethod(other.to_string())),
        };

        if !self.auth.ensure_valid_token().await {
            return Err(Error::NotAuthenticated);
        }
        let token = self.auth.access_token().ok_or(Error::NotAuthenticated)?;

        let url = format!("{}{endpoint}", self.base_url);
        debug!(method = %method, %url, "Graph request");

        let mut request = self.http_client.request(method, url).bearer_auth(&token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteApi { status, body });
        }

        Ok(response)
    }

    /// List all OneNote notebooks for the signed-in user.
    pub async fn list_notebooks(&self) -> Result<Vec<NotebookSummary>> {
        let response = self.call("/me/onenote/notebooks", "GET", None).await?;
        Ok(collection(&response)
            .iter()
            .map(|nb| NotebookSummary {
                id: str_field(nb, "id"),
                name: str_field(nb, "displayName"),
                created: opt_field(nb, "createdDateTime"),
                modified: opt_field(nb, "lastModifiedDateTime"),
            })
            .collect())
    }

    /// List the sections of a notebook.
    pub async fn list_sections(&self, notebook_id: &str) -> Result<Vec<SectionSummary>> {
        let endpoint = format!("/me/onenote/notebooks/{notebook_id}/sections");
        let response = self.call(&endpoint, "GET", None).await?;
        Ok(collection(&response)
            .iter()
            .map(|section| SectionSummary {
                id: str_field(section, "id"),
                name: str_field(section, "displayName"),
                created: opt_field(section, "createdDateTime"),
                modified: opt_field(section, "lastModifiedDateTime"),
            })
            .collect())
    }

    /// List the pages of a section.
    pub async fn list_pages(&self, section_id: &str) -> Result<Vec<PageSummary>> {
        let endpoint = format!("/me/onenote/sections/{section_id}/pages");
        let response = self.call(&endpoint, "GET", None).await?;
        Ok(collection(&response)
            .iter()
            .map(|page| PageSummary {
                id: str_field(page, "id"),
                title: str_field(page, "title"),
                created: opt_field(page, "createdDateTime"),
                modified: opt_field(page, "lastModifiedDateTime"),
                content_url: opt_field(page, "contentUrl"),
            })
            .collect())
    }

    /// Fetch the HTML content of a page.
    pub async fn get_page_content(&self, page_id: &str) -> Result<String> {
        self.get_text(&format!("/me/onenote/pages/{page_id}/content"))
            .await
    }

    /// Fetch the signed-in user's profile.
    pub async fn me(&self) -> Result<UserProfile> {
        let response = self.call("/me", "GET", None).await?;
        Ok(UserProfile::from_me_response(&response))
    }
}

/// Graph collection responses wrap their items in a `value` array.
fn collection(response: &Value) -> Vec<Value> {
    response
        .get("value")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn profile_prefers_mail_over_upn() {
        let value = json!({
            "displayName": "Ada Lovelace",
            "mail": "ada@example.com",
            "userPrincipalName": "ada@corp.example.com"
        });
        let profile = UserProfile::from_me_response(&value);
        assert_eq!(profile.display_name, "Ada Lovelace");
        assert_eq!(profile.email, "ada@example.com");
    }

    #[test]
    fn profile_falls_back_to_upn() {
        let value = json!({
            "displayName": "Ada Lovelace",
            "mail": null,
            "userPrincipalName": "ada@corp.example.com"
        });
        let profile = UserProfile::from_me_response(&value);
        assert_eq!(profile.email, "ada@corp.example.com");
    }

    #[test]
    fn profile_defaults_when_fields_missing() {
        let profile = UserProfile::from_me_response(&json!({}));
        assert_eq!(profile.display_name, "Unknown");
        assert_eq!(profile.email, "Unknown");
    }

    #[test]
    fn collection_unwraps_value_array() {
        let response = json!({"value": [{"id": "1"}, {"id": "2"}]});
        assert_eq!(collection(&response).len(), 2);
        assert!(collection(&json!({})).is_empty());
        assert!(collection(&json!({"value": "not-an-array"})).is_empty());
    }

    #[tokio::test]
    async fn unsupported_method_fails_before_network_io() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::Config {
            azure_client_id: "test-client".to_string(),
            cache_dir: Some(dir.path().to_path_buf()),
            ..crate::config::Config::default()
        };
        let auth = Arc::new(AuthManager::new(Client::new(), config).unwrap());
        // Unroutable base URL: the test only passes if no request is sent
        let client = GraphClient::new(
            Client::new(),
            auth,
            "http://127.0.0.1:1/v1.0".to_string(),
        );

        let err = client.call("/me", "DELETE", None).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod(m) if m == "DELETE"));
    }

    #[tokio::test]
    async fn unauthenticated_call_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::Config {
            azure_client_id: "test-client".to_string(),
            cache_dir: Some(dir.path().to_path_buf()),
            ..crate::config::Config::default()
        };
        let auth = Arc::new(AuthManager::new(Client::new(), config).unwrap());
        let client = GraphClient::new(
            Client::new(),
            auth,
            "http://127.0.0.1:1/v1.0".to_string(),
        );

        let err = client.call("/me/onenote/notebooks", "GET", None).await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
    }
}
