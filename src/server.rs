//! Stdio MCP server and tool surface
//!
//! Speaks line-delimited JSON-RPC 2.0 on stdin/stdout. Every tool handler
//! catches every error at its boundary and converts it into a structured
//! `{status: "error"}` result, so the calling assistant always receives a
//! parsable response rather than a protocol fault.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::auth::AuthManager;
use crate::error::rpc_codes;
use crate::graph::GraphClient;
use crate::protocol::{
    Content, Info, InitializeResult, JsonRpcMessage, JsonRpcResponse, PROTOCOL_VERSION,
    RequestId, ServerCapabilities, Tool, ToolAnnotations, ToolsCallParams, ToolsCallResult,
    ToolsCapability, ToolsListResult,
};
use crate::{Error, Result};

/// Server name advertised during initialization
const SERVER_NAME: &str = "onenote-mcp";

/// The OneNote MCP server.
pub struct Server {
    auth: Arc<AuthManager>,
    graph: Arc<GraphClient>,
}

impl Server {
    /// Create a server over the given auth manager and Graph gateway.
    #[must_use]
    pub fn new(auth: Arc<AuthManager>, graph: Arc<GraphClient>) -> Self {
        Self { auth, graph }
    }

    /// Serve JSON-RPC over stdin/stdout until EOF.
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve JSON-RPC over arbitrary reader/writer pairs.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();

        info!("OneNote MCP server ready");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line).await {
                let serialized = serde_json::to_string(&response)?;
                writer.write_all(serialized.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    /// Handle one incoming line. Returns `None` for notifications (no
    /// response is sent).
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let message: JsonRpcMessage = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Failed to parse JSON-RPC message");
                return Some(JsonRpcResponse::error(
                    None,
                    rpc_codes::PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
        };

        match message {
            JsonRpcMessage::Request(request) => {
                debug!(method = %request.method, id = %request.id, "Request");
                Some(self.handle_request(&request.method, request.id, request.params).await)
            }
            JsonRpcMessage::Notification(notification) => {
                debug!(method = %notification.method, "Notification ignored");
                None
            }
            JsonRpcMessage::Response(_) => {
                debug!("Unexpected response message ignored");
                None
            }
        }
    }

    async fn handle_request(
        &self,
        method: &str,
        id: RequestId,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        match method {
            "initialize" => handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => {
                let result = ToolsListResult {
                    tools: tool_definitions(),
                };
                match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => JsonRpcResponse::error(
                        Some(id),
                        rpc_codes::INTERNAL_ERROR,
                        e.to_string(),
                    ),
                }
            }
            "tools/call" => {
                let params: ToolsCallParams =
                    match params.map(serde_json::from_value).transpose() {
                        Ok(Some(p)) => p,
                        Ok(None) => {
                            return JsonRpcResponse::error(
                                Some(id),
                                rpc_codes::INVALID_PARAMS,
                                "Missing params for tools/call",
                            );
                        }
                        Err(e) => {
                            return JsonRpcResponse::error(
                                Some(id),
                                rpc_codes::INVALID_PARAMS,
                                format!("Invalid params: {e}"),
                            );
                        }
                    };

                let result = self.call_tool(&params.name, &params.arguments).await;
                match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => JsonRpcResponse::error(
                        Some(id),
                        rpc_codes::INTERNAL_ERROR,
                        e.to_string(),
                    ),
                }
            }
            other => JsonRpcResponse::error(
                Some(id),
                rpc_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        }
    }

    /// Run a tool and fold any error into a structured text result.
    pub async fn call_tool(&self, name: &str, arguments: &Value) -> ToolsCallResult {
        let outcome = match name {
            "start_authentication" => self.start_authentication().await,
            "complete_authentication" => self.complete_authentication().await,
            "check_auth_status" => self.check_auth_status().await,
            "test_authentication" => self.test_authentication().await,
            "list_notebooks" => self.list_notebooks().await,
            "list_sections" => match required_arg(arguments, "notebook_id") {
                Ok(notebook_id) => self.list_sections(&notebook_id).await,
                Err(e) => Err(e),
            },
            "list_pages" => match required_arg(arguments, "section_id") {
                Ok(section_id) => self.list_pages(&section_id).await,
                Err(e) => Err(e),
            },
            "get_page_content" => match required_arg(arguments, "page_id") {
                Ok(page_id) => self.get_page_content(&page_id).await,
                Err(e) => Err(e),
            },
            "clear_auth" => self.clear_auth(),
            other => Err(Error::Protocol(format!("Unknown tool: {other}"))),
        };

        match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(tool = name, error = %e, "Tool failed");
                ToolsCallResult::error_text(error_envelope(&e))
            }
        }
    }

    async fn start_authentication(&self) -> Result<ToolsCallResult> {
        let flow = self.auth.start_device_flow().await?;
        let body = json!({
            "status": "authentication_required",
            "instructions": format!(
                "Go to {} and enter code: {}",
                flow.verification_uri, flow.user_code
            ),
            "verification_uri": flow.verification_uri,
            "user_code": flow.user_code,
            "expires_in": flow.expires_in(),
            "message": "Please complete authentication, then call 'complete_authentication'"
        });
        Ok(ToolsCallResult::text(pretty(&body)))
    }

    async fn complete_authentication(&self) -> Result<ToolsCallResult> {
        match self.auth.complete_device_flow().await {
            Ok(profile) => {
                let body = json!({
                    "status": "success",
                    "message": "Authentication completed successfully",
                    "user": profile.display_name,
                    "email": profile.email,
                });
                Ok(ToolsCallResult::text(pretty(&body)))
            }
            // A token was issued but the verification probe failed: the
            // token is kept, so report this distinctly from a denied flow.
            Err(e @ (Error::RemoteApi { .. } | Error::Http(_))) => {
                let body = json!({
                    "status": "partial_success",
                    "message": "Got access token but the Graph API test failed",
                    "graph_error": e.to_string(),
                });
                Ok(ToolsCallResult::text(pretty(&body)))
            }
            Err(e) => Err(e),
        }
    }

    async fn check_auth_status(&self) -> Result<ToolsCallResult> {
        let status = self.auth.status().await;
        Ok(ToolsCallResult::text(pretty(&serde_json::to_value(
            status,
        )?)))
    }

    async fn test_authentication(&self) -> Result<ToolsCallResult> {
        let profile = self.graph.me().await?;
        let body = json!({
            "status": "success",
            "user": profile.display_name,
            "email": profile.email,
            "message": "Authentication working correctly",
        });
        Ok(ToolsCallResult::text(pretty(&body)))
    }

    async fn list_notebooks(&self) -> Result<ToolsCallResult> {
        let notebooks = self.graph.list_notebooks().await?;
        info!(count = notebooks.len(), "Listed notebooks");
        Ok(ToolsCallResult::text(pretty(&serde_json::to_value(
            notebooks,
        )?)))
    }

    async fn list_sections(&self, notebook_id: &str) -> Result<ToolsCallResult> {
        let sections = self.graph.list_sections(notebook_id).await?;
        Ok(ToolsCallResult::text(pretty(&serde_json::to_value(
            sections,
        )?)))
    }

    async fn list_pages(&self, section_id: &str) -> Result<ToolsCallResult> {
        let pages = self.graph.list_pages(section_id).await?;
        Ok(ToolsCallResult::text(pretty(&serde_json::to_value(pages)?)))
    }

    async fn get_page_content(&self, page_id: &str) -> Result<ToolsCallResult> {
        // Raw HTML, not JSON; returned as-is
        let content = self.graph.get_page_content(page_id).await?;
        Ok(ToolsCallResult::text(content))
    }

    fn clear_auth(&self) -> Result<ToolsCallResult> {
        self.auth.clear();
        let body = json!({
            "status": "success",
            "message": "Cached tokens cleared",
        });
        Ok(ToolsCallResult::text(pretty(&body)))
    }
}

fn handle_initialize(id: RequestId) -> JsonRpcResponse {
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability::default()),
        },
        server_info: Info {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        instructions: Some(
            "Browse Microsoft OneNote notebooks. Run 'start_authentication' then \
             'complete_authentication' before the listing tools."
                .to_string(),
        ),
    };

    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(Some(id), rpc_codes::INTERNAL_ERROR, e.to_string()),
    }
}

/// Structured failure envelope returned to the assistant.
fn error_envelope(error: &Error) -> String {
    pretty(&json!({
        "status": "error",
        "error": error.to_string(),
    }))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Extract a required string argument from the tool arguments object.
fn required_arg(arguments: &Value, key: &str) -> Result<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| Error::Protocol(format!("Missing required argument: {key}")))
}

/// The advertised tool set.
fn tool_definitions() -> Vec<Tool> {
    let read_only = Some(ToolAnnotations {
        read_only_hint: Some(true),
        destructive_hint: None,
    });
    let no_args = json!({"type": "object", "properties": {}, "required": []});

    vec![
        Tool {
            name: "start_authentication".to_string(),
            description: Some(
                "Start Microsoft sign-in. Returns a verification URL and user code".to_string(),
            ),
            input_schema: no_args.clone(),
            annotations: None,
        },
        Tool {
            name: "complete_authentication".to_string(),
            description: Some(
                "Complete sign-in after the user entered the device code".to_string(),
            ),
            input_schema: no_args.clone(),
            annotations: None,
        },
        Tool {
            name: "check_auth_status".to_string(),
            description: Some(
                "Check authentication status, remaining token validity, and cache info"
                    .to_string(),
            ),
            input_schema: no_args.clone(),
            annotations: read_only.clone(),
        },
        Tool {
            name: "test_authentication".to_string(),
            description: Some(
                "Verify connectivity to Microsoft Graph with the current token".to_string(),
            ),
            input_schema: no_args.clone(),
            annotations: read_only.clone(),
        },
        Tool {
            name: "list_notebooks".to_string(),
            description: Some("List all OneNote notebooks".to_string()),
            input_schema: no_args.clone(),
            annotations: read_only.clone(),
        },
        Tool {
            name: "list_sections".to_string(),
            description: Some("List sections in a notebook".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "notebook_id": {
                        "type": "string",
                        "description": "ID of the notebook to list sections from"
                    }
                },
                "required": ["notebook_id"]
            }),
            annotations: read_only.clone(),
        },
        Tool {
            name: "list_pages".to_string(),
            description: Some("List pages in a section".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "section_id": {
                        "type": "string",
                        "description": "ID of the section to list pages from"
                    }
                },
                "required": ["section_id"]
            }),
            annotations: read_only.clone(),
        },
        Tool {
            name: "get_page_content".to_string(),
            description: Some("Get the HTML content of a page".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "page_id": {
                        "type": "string",
                        "description": "ID of the page to retrieve content from"
                    }
                },
                "required": ["page_id"]
            }),
            annotations: read_only,
        },
        Tool {
            name: "clear_auth".to_string(),
            description: Some(
                "Clear cached tokens from memory and disk, signing the user out".to_string(),
            ),
            input_schema: no_args,
            annotations: Some(ToolAnnotations {
                read_only_hint: Some(false),
                destructive_hint: Some(true),
            }),
        },
    ]
}
