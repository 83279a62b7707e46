// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end tests wiring the worker loop to real sessions and tools.
//!
//! The worker library runs against an in-memory duplex standing in for its
//! stdio pipes; this side of the pipe plays the orchestrator, executing
//! tool requests against a real `Session` through the tool registry and
//! answering environment-details requests from the same session.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use emigo_config::{AgentConfig, ModelConfig};
use emigo_frontend::ScriptedFrontend;
use emigo_model::{Message, ResponseEvent, ScriptedMockProvider};
use emigo_protocol::{
    decode_line, write_message, FinishStatus, InteractionInput, StreamRole, WorkerEvent,
    WorkerRequest,
};
use emigo_session::{normalize, Session};
use emigo_tools::{default_registry, ToolContext};
use emigo_worker::{run_interaction, WorkerIo};

struct Harness {
    _dir: tempfile::TempDir,
    session_path: PathBuf,
    session: Arc<Mutex<Session>>,
    frontend: Arc<ScriptedFrontend>,
}

fn harness(files: &[(&str, &str)]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
    let session_path = normalize(dir.path());
    Harness {
        session: Arc::new(Mutex::new(Session::new(session_path.clone(), false))),
        session_path,
        frontend: Arc::new(ScriptedFrontend::new()),
        _dir: dir,
    }
}

impl Harness {
    fn tool_context(&self) -> ToolContext {
        ToolContext {
            session: self.session.clone(),
            frontend: self.frontend.clone(),
            repomap: None,
            session_path: self.session_path.clone(),
        }
    }

    async fn input(&self, prompt: &str) -> InteractionInput {
        let mut session = self.session.lock().await;
        session.append_message(Message::user(prompt));
        InteractionInput {
            session_path: self.session_path.to_string_lossy().into_owned(),
            prompt: prompt.to_string(),
            history: session.history_snapshot(),
            chat_files: session.chat_files().to_vec(),
            environment_details: session.render_environment_details(),
            config: ModelConfig {
                model: "scripted".into(),
                ..Default::default()
            },
        }
    }

    /// Run the worker against `provider`, serving tool and environment
    /// requests like the orchestrator would.  Returns every worker event.
    async fn run(&self, provider: ScriptedMockProvider, input: InteractionInput) -> Vec<WorkerEvent> {
        let (orch_side, worker_side) = tokio::io::duplex(1 << 20);
        let (worker_r, worker_w) = tokio::io::split(worker_side);
        let mut io = WorkerIo::new(BufReader::new(worker_r), worker_w);
        let cfg = AgentConfig::default();

        let worker = async move {
            run_interaction(&provider, &cfg, input, &mut io).await.unwrap();
        };

        let registry = default_registry();
        let ctx = self.tool_context();
        let orchestrator = async move {
            let (orch_r, mut orch_w) = tokio::io::split(orch_side);
            let mut lines = BufReader::new(orch_r).lines();
            let mut events = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                let event: WorkerEvent = decode_line(&line).unwrap();
                match &event {
                    WorkerEvent::ToolRequest { request_id, tool_name, parameters, .. } => {
                        let result = registry.execute(&ctx, tool_name, parameters).await;
                        write_message(
                            &mut orch_w,
                            &WorkerRequest::ToolResult {
                                request_id: request_id.clone(),
                                result,
                            },
                        )
                        .await
                        .unwrap();
                    }
                    WorkerEvent::GetEnvironmentDetailsRequest { request_id, session } => {
                        let details = ctx.session.lock().await.render_environment_details();
                        write_message(
                            &mut orch_w,
                            &WorkerRequest::GetEnvironmentDetailsResponse {
                                request_id: request_id.clone(),
                                session: session.clone(),
                                details,
                            },
                        )
                        .await
                        .unwrap();
                    }
                    _ => {}
                }
                let done = matches!(event, WorkerEvent::Finished { .. });
                events.push(event);
                if done {
                    break;
                }
            }
            events
        };

        let (_, events) = tokio::join!(worker, orchestrator);
        events
    }
}

fn finished(events: &[WorkerEvent]) -> (&FinishStatus, &Vec<Message>) {
    match events.last().unwrap() {
        WorkerEvent::Finished { status, final_history: Some(h), .. } => (status, h),
        other => panic!("expected finished with history, got {other:?}"),
    }
}

#[tokio::test]
async fn basic_question_and_answer() {
    let h = harness(&[]);
    let provider = ScriptedMockProvider::new(vec![vec![
        ResponseEvent::TextDelta("4".into()),
        ResponseEvent::TextDelta(".".into()),
        ResponseEvent::Done,
    ]]);
    let input = h.input("2+2?").await;
    let events = h.run(provider, input).await;

    let chunks: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::Stream { role: StreamRole::Llm, content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["4", "."]);

    let (status, history) = finished(&events);
    assert_eq!(*status, FinishStatus::Success);
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].text(), Some("4."));
}

#[tokio::test]
async fn read_file_tool_round_trip_updates_session() {
    let h = harness(&[("a.txt", "hello\n")]);
    let provider = ScriptedMockProvider::tool_then_text(
        "call_1",
        "read_file",
        r#"{"path":"a.txt"}"#,
        "The file greets the reader.",
    );
    let input = h.input("summarize @a.txt").await;
    let events = h.run(provider, input).await;

    // The tool actually ran: the session gained the file and its cache.
    {
        let mut session = h.session.lock().await;
        assert_eq!(session.chat_files(), &["a.txt".to_string()]);
        assert_eq!(session.cached_content("a.txt").as_deref(), Some("hello\n"));
    }

    let (status, history) = finished(&events);
    assert_eq!(*status, FinishStatus::Success);
    // user, assistant(tool call), tool result, assistant text
    assert_eq!(history.len(), 4);
    assert_eq!(history[3].text(), Some("The file greets the reader."));

    // The refreshed environment details included the cached file content.
    assert!(events.iter().any(|e| matches!(e,
        WorkerEvent::GetEnvironmentDetailsRequest { .. })));
}

#[tokio::test]
async fn replace_in_file_tool_edits_through_editor_rpc() {
    let h = harness(&[("x.py", "def add(a,b):\n    return a+b\n")]);
    h.session.lock().await.add_chat_file("x.py").unwrap();

    let diff = "<<<<<<< SEARCH\n    return a+b\n=======\n    return a + b\n>>>>>>> REPLACE";
    let args = serde_json::json!({"path": "x.py", "diff": diff}).to_string();
    let provider = ScriptedMockProvider::tool_then_text("call_2", "replace_in_file", args, "Done.");

    let input = h.input("fix spacing in x.py").await;
    let events = h.run(provider, input).await;

    let (status, history) = finished(&events);
    assert_eq!(*status, FinishStatus::Success);
    assert!(matches!(&history[2],
        Message::Tool { content, .. } if content.contains("modified successfully")));

    // The editor applied the plan and the cache picked up the result.
    assert_eq!(
        h.session.lock().await.cached_content("x.py").as_deref(),
        Some("def add(a,b):\n    return a + b\n")
    );
    assert_eq!(
        std::fs::read_to_string(h.session_path.join("x.py")).unwrap(),
        "def add(a,b):\n    return a + b\n"
    );
}

#[tokio::test]
async fn completion_tool_ends_interaction_and_reaches_frontend() {
    let h = harness(&[]);
    let provider = ScriptedMockProvider::tool_then_text(
        "call_3",
        "attempt_completion",
        r#"{"result":"Everything is in place."}"#,
        "unreachable",
    );
    let input = h.input("wrap up").await;
    let events = h.run(provider, input).await;

    let (status, history) = finished(&events);
    assert_eq!(*status, FinishStatus::Success);
    assert!(matches!(&history[2],
        Message::Tool { content, .. } if content == "COMPLETION_SIGNALLED"));
    assert!(h.frontend.calls().iter().any(|c| matches!(
        c,
        emigo_frontend::RecordedCall::CompletionSignalled { text, .. }
            if text == "Everything is in place."
    )));

    // No further LLM round after the completion sentinel.
    assert!(!events.iter().any(|e| matches!(e,
        WorkerEvent::Stream { role: StreamRole::Llm, content, .. } if content == "unreachable")));
}
