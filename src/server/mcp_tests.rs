//! Unit tests for MCP protocol implementation.
//!
//! Tests JSON-RPC 2.0 framing, tool definitions and in-process request
//! dispatch against a small seeded knowledge graph.

use super::*;
use crate::config::{Config, DiagnosisConfig, GraphConfig, LogFormat, LoggingConfig, RequestConfig};
use crate::graph::{GraphHandle, KnowledgeGraph};
use crate::server::AppState;
use crate::session::DiagnosisService;
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

fn test_server() -> McpServer {
    let config = Config {
        graph: GraphConfig {
            path: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        },
        matcher: None,
        request: RequestConfig::default(),
        diagnosis: DiagnosisConfig::default(),
    };
    let graph = KnowledgeGraph::builder()
        .phenomenon("P1", "replication lag growing", "SHOW REPLICA STATUS")
        .phenomenon("P2", "relay log apply single threaded", "SHOW PROCESSLIST")
        .root_cause("RC1", "single-threaded apply", "enable parallel apply workers")
        .ticket("T1", "RC1", ["P1", "P2"])
        .build();
    let service = DiagnosisService::new(GraphHandle::new(graph), config.diagnosis.clone());
    McpServer::new(Arc::new(AppState::new(config, service)))
}

fn request(id: i64, method: &str, params: Option<Value>) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(id)),
        method: method.to_string(),
        params,
    }
}

fn call(id: i64, tool: &str, arguments: Value) -> JsonRpcRequest {
    request(
        id,
        "tools/call",
        Some(json!({"name": tool, "arguments": arguments})),
    )
}

/// Unwrap the JSON payload of a successful tool call.
fn tool_payload(response: JsonRpcResponse) -> Value {
    let result = response.result.expect("tool call result");
    assert!(result.get("isError").is_none(), "unexpected tool error: {}", result);
    let text = result["content"][0]["text"].as_str().unwrap().to_string();
    serde_json::from_str(&text).unwrap()
}

// ============================================================================
// JSON-RPC framing
// ============================================================================

#[test]
fn test_jsonrpc_response_success_omits_error() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"ok": true}));
    let serialized = serde_json::to_value(&response).unwrap();

    assert_eq!(serialized["jsonrpc"], "2.0");
    assert_eq!(serialized["id"], 1);
    assert!(serialized.get("error").is_none());
}

#[test]
fn test_jsonrpc_response_error_without_id_is_null() {
    let response = JsonRpcResponse::error(None, -32700, "Parse error");
    let serialized = serde_json::to_value(&response).unwrap();

    assert_eq!(serialized["id"], Value::Null);
    assert_eq!(serialized["error"]["code"], -32700);
    assert!(serialized.get("result").is_none());
}

#[test]
fn test_jsonrpc_notification_has_no_id() {
    let request: JsonRpcRequest =
        serde_json::from_value(json!({"jsonrpc": "2.0", "method": "initialized"})).unwrap();
    assert!(request.id.is_none());
    assert!(request.params.is_none());
}

// ============================================================================
// Tool definitions
// ============================================================================

#[test]
fn test_all_tools_have_object_schemas() {
    for tool in all_tools() {
        assert!(tool.name.starts_with("diagnosis_"), "{}", tool.name);
        assert!(!tool.description.is_empty());
        assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
        assert!(tool.input_schema["properties"].is_object(), "{}", tool.name);
        assert_eq!(
            tool.input_schema["additionalProperties"], false,
            "{}",
            tool.name
        );
    }
}

#[test]
fn test_tool_names_are_unique() {
    let tools = all_tools();
    let names: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names.len(), tools.len());
    assert_eq!(tools.len(), 8);
}

#[test]
fn test_turn_tool_requires_session_id() {
    let tools = all_tools();
    let turn = tools.iter().find(|t| t.name == "diagnosis_turn").unwrap();
    assert_eq!(turn.input_schema["required"], json!(["session_id"]));
    assert_eq!(
        turn.input_schema["properties"]["confirmed"]["items"]["properties"]["score"]["maximum"],
        1
    );
}

// ============================================================================
// Request dispatch
// ============================================================================

#[tokio::test]
async fn test_initialize_reports_server_info() {
    let server = test_server();
    let response = server
        .handle_request(request(1, "initialize", None))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let server = test_server();
    let notification = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: None,
        method: "initialized".to_string(),
        params: None,
    };
    assert!(server.handle_request(notification).await.is_none());
}

#[tokio::test]
async fn test_unknown_method() {
    let server = test_server();
    let response = server
        .handle_request(request(7, "resources/list", None))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn test_tools_list() {
    let server = test_server();
    let response = server
        .handle_request(request(2, "tools/list", None))
        .await
        .unwrap();
    let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
    assert_eq!(tools, 8);
}

#[tokio::test]
async fn test_tools_call_missing_params() {
    let server = test_server();
    let response = server
        .handle_request(request(3, "tools/call", None))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_tool_error_is_reported_in_content() {
    let server = test_server();
    let response = server
        .handle_request(call(4, "diagnosis_get_session", json!({"session_id": "missing"})))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Session not found"));
}

#[tokio::test]
async fn test_diagnosis_flow_over_tool_calls() {
    let server = test_server();

    let created = tool_payload(
        server
            .handle_request(call(
                1,
                "diagnosis_create_session",
                json!({"user_problem": "replica falling behind"}),
            ))
            .await
            .unwrap(),
    );
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let first = tool_payload(
        server
            .handle_request(call(
                2,
                "diagnosis_turn",
                json!({"session_id": session_id, "confirmed": [{"phenomenon_id": "P1"}]}),
            ))
            .await
            .unwrap(),
    );
    assert_eq!(first["status"], "narrowing");
    assert_eq!(first["next"]["kind"], "recommend");
    assert_eq!(first["next"]["recommendations"][0]["phenomenon_id"], "P2");

    let second = tool_payload(
        server
            .handle_request(call(
                3,
                "diagnosis_turn",
                json!({"session_id": session_id, "confirmed": [{"phenomenon_id": "P2"}]}),
            ))
            .await
            .unwrap(),
    );
    assert_eq!(second["status"], "confirming");
    assert_eq!(second["next"]["kind"], "diagnose");
    assert_eq!(second["next"]["diagnosis"]["root_cause_id"], "RC1");

    let snapshot = tool_payload(
        server
            .handle_request(call(4, "diagnosis_get_session", json!({"session_id": session_id})))
            .await
            .unwrap(),
    );
    assert_eq!(snapshot["status"], "diagnosed");
    assert_eq!(snapshot["round_count"], 2);

    let deleted = tool_payload(
        server
            .handle_request(call(
                5,
                "diagnosis_delete_session",
                json!({"session_id": session_id}),
            ))
            .await
            .unwrap(),
    );
    assert_eq!(deleted["deleted"], true);
}

#[tokio::test]
async fn test_chat_without_matcher_is_a_tool_error() {
    let server = test_server();
    let created = tool_payload(
        server
            .handle_request(call(
                1,
                "diagnosis_create_session",
                json!({"user_problem": "replica falling behind"}),
            ))
            .await
            .unwrap(),
    );

    let response = server
        .handle_request(call(
            2,
            "diagnosis_chat",
            json!({"session_id": created["session_id"], "text": "lag keeps growing"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.result.unwrap()["isError"], true);
}
