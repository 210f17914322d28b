use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::session::TurnInput;

/// Arguments of `diagnosis_create_session`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionParams {
    /// Problem statement reported by the operator.
    pub user_problem: String,
}

/// Arguments of `diagnosis_turn`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TurnParams {
    /// Target session.
    pub session_id: String,
    /// Evidence for the turn.
    #[serde(flatten)]
    pub input: TurnInput,
}

/// Arguments of `diagnosis_chat`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatParams {
    /// Target session.
    pub session_id: String,
    /// Operator message.
    pub text: String,
}

/// Arguments of tools that address a single session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionParams {
    /// Target session.
    pub session_id: String,
}

/// A tool call with its arguments validated.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    /// Open a session.
    CreateSession(CreateSessionParams),
    /// Apply structured evidence.
    Turn(TurnParams),
    /// Apply free text through the matcher.
    Chat(ChatParams),
    /// Read a session.
    GetSession(SessionParams),
    /// Clear a session.
    ResetSession(SessionParams),
    /// Destroy a session.
    DeleteSession(SessionParams),
    /// Knowledge graph counts.
    GraphStats,
    /// Rebuild the knowledge graph from its database.
    ReloadGraph,
}

impl ToolCall {
    /// Parse a tool name and its raw arguments
    pub fn parse(tool_name: &str, arguments: Option<Value>) -> McpResult<Self> {
        let call = match tool_name {
            "diagnosis_create_session" => {
                ToolCall::CreateSession(parse_arguments(tool_name, arguments)?)
            }
            "diagnosis_turn" => ToolCall::Turn(parse_arguments(tool_name, arguments)?),
            "diagnosis_chat" => ToolCall::Chat(parse_arguments(tool_name, arguments)?),
            "diagnosis_get_session" => ToolCall::GetSession(parse_arguments(tool_name, arguments)?),
            "diagnosis_reset_session" => {
                ToolCall::ResetSession(parse_arguments(tool_name, arguments)?)
            }
            "diagnosis_delete_session" => {
                ToolCall::DeleteSession(parse_arguments(tool_name, arguments)?)
            }
            "diagnosis_graph_stats" => ToolCall::GraphStats,
            "diagnosis_reload_graph" => ToolCall::ReloadGraph,
            _ => {
                return Err(McpError::UnknownTool {
                    tool_name: tool_name.to_string(),
                })
            }
        };
        Ok(call)
    }
}

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    let service = &state.service;
    match ToolCall::parse(tool_name, arguments)? {
        ToolCall::CreateSession(params) => {
            let session_id = service.create_session(&params.user_problem).await?;
            to_value(&CreateSessionResponse { session_id })
        }
        ToolCall::Turn(params) => to_value(&service.turn(&params.session_id, params.input).await?),
        ToolCall::Chat(params) => to_value(&service.chat(&params.session_id, &params.text).await?),
        ToolCall::GetSession(params) => to_value(&service.get_session(&params.session_id).await?),
        ToolCall::ResetSession(params) => to_value(&service.reset(&params.session_id).await?),
        ToolCall::DeleteSession(params) => {
            service.delete_session(&params.session_id).await?;
            to_value(&DeleteSessionResponse {
                session_id: params.session_id,
                deleted: true,
            })
        }
        ToolCall::GraphStats => to_value(&state.graph_stats()),
        ToolCall::ReloadGraph => to_value(&state.reload_graph().await?),
    }
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct DeleteSessionResponse {
    session_id: String,
    deleted: bool,
}

fn to_value<T: Serialize>(value: &T) -> McpResult<Value> {
    serde_json::to_value(value).map_err(McpError::Json)
}

fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestParams {
        content: String,
        value: i32,
    }

    #[test]
    fn test_parse_arguments_success() {
        let args = Some(json!({
            "content": "test content",
            "value": 42
        }));

        let params: TestParams = parse_arguments("test.tool", args).unwrap();
        assert_eq!(params.content, "test content");
        assert_eq!(params.value, 42);
    }

    #[test]
    fn test_parse_arguments_missing_arguments() {
        let result: McpResult<TestParams> = parse_arguments("test.tool", None);

        let err = result.unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters { .. }));
        assert!(err.to_string().contains("Missing arguments"));
        assert!(err.to_string().contains("test.tool"));
    }

    #[test]
    fn test_parse_arguments_wrong_type() {
        let args = Some(json!({
            "content": "test",
            "value": "not a number"
        }));

        let result: McpResult<TestParams> = parse_arguments("test.tool", args);
        assert!(matches!(result, Err(McpError::InvalidParameters { .. })));
    }

    #[test]
    fn test_parse_create_session() {
        let call = ToolCall::parse(
            "diagnosis_create_session",
            Some(json!({"user_problem": "checkpoint stalls"})),
        )
        .unwrap();

        assert_eq!(
            call,
            ToolCall::CreateSession(CreateSessionParams {
                user_problem: "checkpoint stalls".to_string()
            })
        );
    }

    #[test]
    fn test_parse_turn_flattens_input() {
        let call = ToolCall::parse(
            "diagnosis_turn",
            Some(json!({
                "session_id": "s-1",
                "confirmed": [{"phenomenon_id": "P1", "score": 0.8}],
                "denied": ["P2"],
                "root_cause_matches": [{"root_cause_id": "RC1", "score": 0.5}]
            })),
        )
        .unwrap();

        let ToolCall::Turn(params) = call else {
            panic!("expected a turn call");
        };
        assert_eq!(params.session_id, "s-1");
        assert_eq!(params.input.confirmed[0].phenomenon_id, "P1");
        assert_eq!(params.input.denied, vec!["P2"]);
        assert_eq!(params.input.root_cause_matches[0].root_cause_id, "RC1");
        assert!(params.input.ticket_matches.is_empty());
    }

    #[test]
    fn test_parse_session_tools() {
        let args = || Some(json!({"session_id": "s-1"}));
        let expected = SessionParams {
            session_id: "s-1".to_string(),
        };

        assert_eq!(
            ToolCall::parse("diagnosis_get_session", args()).unwrap(),
            ToolCall::GetSession(expected.clone())
        );
        assert_eq!(
            ToolCall::parse("diagnosis_reset_session", args()).unwrap(),
            ToolCall::ResetSession(expected.clone())
        );
        assert_eq!(
            ToolCall::parse("diagnosis_delete_session", args()).unwrap(),
            ToolCall::DeleteSession(expected)
        );
    }

    #[test]
    fn test_parse_argumentless_tools() {
        assert_eq!(
            ToolCall::parse("diagnosis_graph_stats", None).unwrap(),
            ToolCall::GraphStats
        );
        assert_eq!(
            ToolCall::parse("diagnosis_reload_graph", Some(json!({}))).unwrap(),
            ToolCall::ReloadGraph
        );
    }

    #[test]
    fn test_parse_rejects_unknown_fields_and_tools() {
        let err = ToolCall::parse(
            "diagnosis_chat",
            Some(json!({"session_id": "s-1", "text": "hi", "extra": 1})),
        )
        .unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters { .. }));

        let err = ToolCall::parse("reasoning_linear", None).unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
    }
}
