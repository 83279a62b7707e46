// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

use emigo_config::ModelConfig;
use emigo_model::Message;

/// Snapshot shipped with an `interaction_request`.  The worker receives
/// everything it needs for one interaction; session state stays with the
/// orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionInput {
    pub session_path: String,
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub chat_files: Vec<String>,
    #[serde(default)]
    pub environment_details: String,
    pub config: ModelConfig,
}

/// Orchestrator → worker messages, one JSON object per line on worker stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    InteractionRequest {
        data: InteractionInput,
    },
    ToolResult {
        request_id: String,
        result: String,
    },
    GetEnvironmentDetailsResponse {
        request_id: String,
        session: String,
        details: String,
    },
    Ping,
}

/// Worker → orchestrator messages, one JSON object per line on worker stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    Stream {
        session: String,
        role: StreamRole,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },
    ToolRequest {
        session: String,
        request_id: String,
        tool_name: String,
        parameters: Value,
    },
    GetEnvironmentDetailsRequest {
        session: String,
        request_id: String,
    },
    Finished {
        session: String,
        status: FinishStatus,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_history: Option<Vec<Message>>,
    },
    Error {
        session: String,
        message: String,
    },
    Pong,
}

/// Role tag on a `stream` event.
///
/// `ToolJson` marks the start of a streamed tool call (content empty),
/// `ToolJsonArgs` carries raw argument fragments verbatim, and `ToolJsonEnd`
/// closes the call (content empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamRole {
    User,
    Llm,
    ToolJson,
    ToolJsonArgs,
    ToolJsonEnd,
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishStatus {
    Success,
    MaxTurnsReached,
    LlmError,
    CriticalError,
}

impl FinishStatus {
    /// Whether a `final_history` accompanies this status and may be applied
    /// to the session.
    pub fn accepts_history(self) -> bool {
        matches!(self, Self::Success | Self::MaxTurnsReached)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_wire_shape() {
        let ev = WorkerEvent::Stream {
            session: "/tmp/proj".into(),
            role: StreamRole::Llm,
            content: "4".into(),
            tool_id: None,
            tool_name: None,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "stream");
        assert_eq!(json["role"], "llm");
        assert_eq!(json["content"], "4");
        assert!(json.get("tool_id").is_none());
    }

    #[test]
    fn tool_json_roles_serialise_with_expected_names() {
        for (role, name) in [
            (StreamRole::ToolJson, "\"tool_json\""),
            (StreamRole::ToolJsonArgs, "\"tool_json_args\""),
            (StreamRole::ToolJsonEnd, "\"tool_json_end\""),
            (StreamRole::Warning, "\"warning\""),
        ] {
            assert_eq!(serde_json::to_string(&role).unwrap(), name);
        }
    }

    #[test]
    fn tool_request_round_trips() {
        let ev = WorkerEvent::ToolRequest {
            session: "/s".into(),
            request_id: "tool_42".into(),
            tool_name: "replace_in_file".into(),
            parameters: serde_json::json!({"path": "x.py", "diff": "…"}),
        };
        let line = serde_json::to_string(&ev).unwrap();
        let back: WorkerEvent = serde_json::from_str(&line).unwrap();
        match back {
            WorkerEvent::ToolRequest { request_id, tool_name, .. } => {
                assert_eq!(request_id, "tool_42");
                assert_eq!(tool_name, "replace_in_file");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn interaction_request_parses_from_editor_wire_json() {
        let line = r#"{
            "type": "interaction_request",
            "data": {
                "session_path": "/tmp/proj",
                "prompt": "2+2?",
                "history": [{"role": "user", "content": "2+2?"}],
                "chat_files": [],
                "environment_details": "<environment_details>\n</environment_details>",
                "config": {"model": "mock", "verbose": false}
            }
        }"#;
        let req: WorkerRequest = serde_json::from_str(line).unwrap();
        match req {
            WorkerRequest::InteractionRequest { data } => {
                assert_eq!(data.session_path, "/tmp/proj");
                assert_eq!(data.history.len(), 1);
                assert_eq!(data.config.model, "mock");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn finished_status_names_are_snake_case() {
        let ev = WorkerEvent::Finished {
            session: "/s".into(),
            status: FinishStatus::MaxTurnsReached,
            message: "Interaction ended after 10 turns.".into(),
            final_history: Some(vec![]),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["status"], "max_turns_reached");
        assert!(json["final_history"].is_array());
    }

    #[test]
    fn error_statuses_do_not_accept_history() {
        assert!(FinishStatus::Success.accepts_history());
        assert!(FinishStatus::MaxTurnsReached.accepts_history());
        assert!(!FinishStatus::LlmError.accepts_history());
        assert!(!FinishStatus::CriticalError.accepts_history());
    }

    #[test]
    fn ping_pong_round_trip() {
        let line = serde_json::to_string(&WorkerRequest::Ping).unwrap();
        assert_eq!(line, r#"{"type":"ping"}"#);
        let pong: WorkerEvent = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(pong, WorkerEvent::Pong));
    }
}
