// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Editor transport: line-delimited JSON over stdio.
//!
//! Both directions share the pipes with request/response correlation by id
//! for the calls that need an answer (approval prompts, command execution,
//! region replacement, questions).  Editor-initiated operations may carry
//! an `id` to receive a `result` line back.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use emigo_core::Orchestrator;
use emigo_frontend::{Frontend, Region};
use emigo_model::Message;
use emigo_protocol::StreamRole;

pub struct StdioFrontend {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    next_id: AtomicU64,
}

impl StdioFrontend {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Arc<Self> {
        Arc::new(Self {
            writer: tokio::sync::Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    async fn write_line(&self, payload: Value) {
        let mut line = payload.to_string();
        line.push('\n');
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(error = %e, "failed to write to editor");
            return;
        }
        let _ = writer.flush().await;
    }

    /// Issue a synchronous call and block until the editor answers (or the
    /// connection dies, which resolves to `Null`).
    async fn call(&self, method: &str, mut params: Value) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        params["op"] = json!("request");
        params["id"] = json!(id);
        params["method"] = json!(method);
        self.write_line(params).await;

        match rx.await {
            Ok(value) => value,
            Err(_) => {
                warn!(method, "editor call abandoned");
                Value::Null
            }
        }
    }

    /// Complete a pending call.  Unknown ids are stale answers and dropped.
    pub fn resolve(&self, id: u64, value: Value) {
        match self.pending.lock().unwrap().remove(&id) {
            Some(tx) => {
                let _ = tx.send(value);
            }
            None => debug!(id, "dropping response with no pending call"),
        }
    }
}

#[async_trait]
impl Frontend for StdioFrontend {
    async fn stream_chunk(
        &self,
        session: &str,
        content: &str,
        role: StreamRole,
        tool_id: Option<&str>,
        tool_name: Option<&str>,
    ) {
        let mut payload = json!({
            "op": "stream_chunk",
            "session": session,
            "content": content,
            "role": role,
        });
        if let Some(id) = tool_id {
            payload["tool_id"] = json!(id);
        }
        if let Some(name) = tool_name {
            payload["tool_name"] = json!(name);
        }
        self.write_line(payload).await;
    }

    async fn interaction_finished(&self, session: &str) {
        self.write_line(json!({"op": "interaction_finished", "session": session}))
            .await;
    }

    async fn file_written_externally(&self, abs_path: &std::path::Path) {
        self.write_line(json!({
            "op": "file_written_externally",
            "path": abs_path.to_string_lossy(),
        }))
        .await;
    }

    async fn completion_signalled(&self, session: &str, text: &str, command: Option<&str>) {
        self.write_line(json!({
            "op": "completion_signalled",
            "session": session,
            "text": text,
            "command": command,
        }))
        .await;
    }

    async fn clear_local_buffer(&self, session: &str) {
        self.write_line(json!({"op": "clear_local_buffer", "session": session}))
            .await;
    }

    async fn message(&self, text: &str) {
        self.write_line(json!({"op": "message", "text": text})).await;
    }

    async fn request_tool_approval(
        &self,
        session: &str,
        tool_name: &str,
        args: &Value,
    ) -> bool {
        self.call(
            "request_tool_approval",
            json!({"session": session, "tool_name": tool_name, "args": args}),
        )
        .await
        .as_bool()
        .unwrap_or(false)
    }

    async fn execute_command(&self, session: &str, command: &str) -> anyhow::Result<String> {
        let value = self
            .call(
                "execute_command",
                json!({"session": session, "command": command}),
            )
            .await;
        match value {
            Value::String(output) => Ok(output),
            other => anyhow::bail!("editor returned no command output: {other}"),
        }
    }

    async fn replace_regions(
        &self,
        abs_path: &std::path::Path,
        regions: &[Region],
    ) -> Result<(), String> {
        let value = self
            .call(
                "replace_regions",
                json!({
                    "path": abs_path.to_string_lossy(),
                    "regions": regions,
                }),
            )
            .await;
        match value {
            Value::Bool(true) => Ok(()),
            Value::String(err) => Err(err),
            other => Err(format!("unexpected editor reply: {other}")),
        }
    }

    async fn ask_user(&self, session: &str, question: &str, options: &[String]) -> Option<String> {
        let value = self
            .call(
                "ask_user",
                json!({"session": session, "question": question, "options": options}),
            )
            .await;
        match value {
            Value::String(answer) if !answer.is_empty() => Some(answer),
            _ => None,
        }
    }

    async fn yes_or_no(&self, question: &str) -> bool {
        self.call("yes_or_no", json!({"question": question}))
            .await
            .as_bool()
            .unwrap_or(false)
    }
}

/// Read editor operations from stdin until EOF.
///
/// Operations run in their own tasks: a `submit_prompt` can block on an
/// approval request whose answer arrives through this very loop, so the
/// loop itself must never wait on an operation.
pub async fn serve(orch: Arc<Orchestrator>, frontend: Arc<StdioFrontend>) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let payload: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, line = %line.trim(), "skipping invalid editor message");
                continue;
            }
        };

        if payload["op"] == "response" {
            if let Some(id) = payload["id"].as_u64() {
                frontend.resolve(id, payload["value"].clone());
            }
            continue;
        }

        let orch = Arc::clone(&orch);
        let frontend = Arc::clone(&frontend);
        tokio::spawn(async move {
            let reply_id = payload["id"].as_u64();
            let result = dispatch_op(&orch, &payload).await;
            if let Some(id) = reply_id {
                frontend
                    .write_line(json!({"op": "result", "id": id, "value": result}))
                    .await;
            }
        });
    }
    Ok(())
}

async fn dispatch_op(orch: &Arc<Orchestrator>, payload: &Value) -> Value {
    let op = payload["op"].as_str().unwrap_or_default();
    let session = PathBuf::from(payload["session"].as_str().unwrap_or_default());
    if session.as_os_str().is_empty() {
        warn!(op, "editor operation without a session");
        return json!({"error": "missing session"});
    }

    match op {
        "submit_prompt" => {
            let text = payload["text"].as_str().unwrap_or_default();
            orch.submit_prompt(&session, text).await;
            Value::Null
        }
        "submit_revised_history" => {
            match serde_json::from_value::<Vec<Message>>(payload["messages"].clone()) {
                Ok(messages) => {
                    orch.submit_revised_history(&session, messages).await;
                    Value::Null
                }
                Err(e) => {
                    warn!(error = %e, "invalid revised history payload");
                    json!({"error": format!("invalid messages: {e}")})
                }
            }
        }
        "cancel" => {
            orch.cancel(&session).await;
            Value::Null
        }
        "add_file" => {
            let path = payload["path"].as_str().unwrap_or_default();
            json!(orch.add_file(&session, path).await)
        }
        "remove_file" => {
            let path = payload["path"].as_str().unwrap_or_default();
            json!(orch.remove_file(&session, path).await)
        }
        "list_files" => json!(orch.list_files(&session).await),
        "history" => serde_json::to_value(orch.history(&session).await).unwrap_or(Value::Null),
        "clear_history" => {
            orch.clear_history(&session).await;
            Value::Null
        }
        other => {
            warn!(op = other, "unknown editor operation");
            json!({"error": format!("unknown op: {other}")})
        }
    }
}
