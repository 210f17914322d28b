//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Stdio-based server communication

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null if notification, must always be present per spec).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP Server running over stdio.
///
/// Handles JSON-RPC 2.0 messages over stdin/stdout for MCP protocol
/// communication with clients.
pub struct McpServer {
    /// Shared application state.
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        info!("MCP root-cause diagnosis server starting...");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            // Only send response if not a notification (per JSON-RPC 2.0 spec)
            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request
    /// Returns None for notifications (requests without id) per JSON-RPC 2.0 spec
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Check if this is a notification (no id = no response required)
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" => {
                // Notification - no response per JSON-RPC 2.0
                debug!("Received initialized notification");
                None
            }
            "notifications/cancelled" => {
                // Notification - no response
                debug!("Received cancelled notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                // For unknown methods, only respond if it's a request (has id)
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");

        let tools = all_tools();

        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "tools": tools
            }),
        )
    }

    /// Handle tools/call request
    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let (content, is_error) =
            match handle_tool_call(&self.state, &params.name, params.arguments).await {
                Ok(result) => {
                    let text = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                        error!(error = %e, "Failed to serialize tool result");
                        format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                    });
                    (
                        ToolResultContent {
                            content_type: "text".to_string(),
                            text,
                        },
                        None,
                    )
                }
                Err(e) => (
                    ToolResultContent {
                        content_type: "text".to_string(),
                        text: format!("Error: {}", e),
                    },
                    Some(true),
                ),
            };

        let tool_result = ToolCallResult {
            content: vec![content],
            is_error,
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id.clone(), -32603, format!("Internal error: {}", e))
            }
        }
    }
}

/// Every tool the server advertises, in `tools/list` order
pub fn all_tools() -> Vec<Tool> {
    vec![
        get_create_session_tool(),
        get_turn_tool(),
        get_chat_tool(),
        get_get_session_tool(),
        get_reset_session_tool(),
        get_delete_session_tool(),
        get_graph_stats_tool(),
        get_reload_graph_tool(),
    ]
}

fn session_id_schema() -> Value {
    serde_json::json!({
        "type": "string",
        "description": "Session ID returned by diagnosis_create_session"
    })
}

fn session_only_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "session_id": session_id_schema()
        },
        "required": ["session_id"],
        "additionalProperties": false
    })
}

fn score_schema(description: &str) -> Value {
    serde_json::json!({
        "type": "number",
        "minimum": 0,
        "maximum": 1,
        "description": description
    })
}

/// Get the create session tool definition
fn get_create_session_tool() -> Tool {
    Tool {
        name: "diagnosis_create_session".to_string(),
        description: "Open a diagnostic session for a database incident. Returns the session ID used by every other diagnosis tool.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "user_problem": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The problem as reported by the operator"
                }
            },
            "required": ["user_problem"],
            "additionalProperties": false
        }),
    }
}

/// Get the structured turn tool definition
fn get_turn_tool() -> Tool {
    Tool {
        name: "diagnosis_turn".to_string(),
        description: "Apply one round of evidence to a session: confirmed and denied phenomena plus optional root-cause and ticket matches. Returns ranked hypotheses and either the next phenomena to check or a diagnosis.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_schema(),
                "confirmed": {
                    "type": "array",
                    "description": "Phenomena the operator observed",
                    "items": {
                        "type": "object",
                        "properties": {
                            "phenomenon_id": {"type": "string"},
                            "score": score_schema("Match confidence, defaults to 1.0")
                        },
                        "required": ["phenomenon_id"]
                    }
                },
                "denied": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Phenomena the operator ruled out; blocks every linked root cause"
                },
                "root_cause_matches": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "root_cause_id": {"type": "string"},
                            "score": score_schema("Match confidence")
                        },
                        "required": ["root_cause_id", "score"]
                    }
                },
                "ticket_matches": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "ticket_id": {"type": "string"},
                            "root_cause_id": {"type": "string"},
                            "score": score_schema("Match confidence")
                        },
                        "required": ["ticket_id", "root_cause_id", "score"]
                    }
                },
                "unmatched_text": {
                    "type": "string",
                    "description": "Free text that resolved to no phenomenon, kept for the record"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the free-text chat tool definition
fn get_chat_tool() -> Tool {
    Tool {
        name: "diagnosis_chat".to_string(),
        description: "Describe what you see in plain language. The message is matched against the knowledge graph and applied as a turn, or a clarification is requested.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_schema(),
                "text": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Operator message"
                }
            },
            "required": ["session_id", "text"],
            "additionalProperties": false
        }),
    }
}

/// Get the session snapshot tool definition
fn get_get_session_tool() -> Tool {
    Tool {
        name: "diagnosis_get_session".to_string(),
        description: "Read a session: evidence so far, current hypotheses, pending recommendations, status and diagnosis.".to_string(),
        input_schema: session_only_schema(),
    }
}

/// Get the reset tool definition
fn get_reset_session_tool() -> Tool {
    Tool {
        name: "diagnosis_reset_session".to_string(),
        description: "Clear a session's evidence and diagnosis, keeping its ID and problem statement.".to_string(),
        input_schema: session_only_schema(),
    }
}

/// Get the delete tool definition
fn get_delete_session_tool() -> Tool {
    Tool {
        name: "diagnosis_delete_session".to_string(),
        description: "Delete a session.".to_string(),
        input_schema: session_only_schema(),
    }
}

/// Get the graph stats tool definition
fn get_graph_stats_tool() -> Tool {
    Tool {
        name: "diagnosis_graph_stats".to_string(),
        description: "Counts of phenomena, root causes, tickets and edges in the loaded knowledge graph.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

/// Get the graph reload tool definition
fn get_reload_graph_tool() -> Tool {
    Tool {
        name: "diagnosis_reload_graph".to_string(),
        description: "Rebuild the knowledge graph from its database. Sessions keep their evidence; the next turn uses the new graph.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}
