// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Scripted frontend for tests.  Records every call and answers the
//! synchronous requests from pre-configured responses.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use emigo_protocol::StreamRole;

use crate::{Frontend, Region};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    StreamChunk {
        session: String,
        content: String,
        role: StreamRole,
        tool_id: Option<String>,
        tool_name: Option<String>,
    },
    InteractionFinished(String),
    FileWrittenExternally(PathBuf),
    CompletionSignalled {
        session: String,
        text: String,
        command: Option<String>,
    },
    ClearLocalBuffer(String),
    Message(String),
    ApprovalRequested {
        session: String,
        tool_name: String,
    },
    ExecuteCommand {
        session: String,
        command: String,
    },
    ReplaceRegions {
        path: PathBuf,
        regions: Vec<Region>,
    },
    AskUser {
        session: String,
        question: String,
    },
    YesOrNo(String),
}

pub struct ScriptedFrontend {
    calls: Mutex<Vec<RecordedCall>>,
    approve: AtomicBool,
    yes_or_no_answer: AtomicBool,
    command_output: Mutex<String>,
    ask_answer: Mutex<Option<String>>,
    replace_error: Mutex<Option<String>>,
    /// When set, `replace_regions` edits the file on disk the way the real
    /// editor does (bottom-up), so cache-refresh paths can be exercised.
    apply_regions_to_disk: AtomicBool,
}

impl Default for ScriptedFrontend {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            approve: AtomicBool::new(true),
            yes_or_no_answer: AtomicBool::new(true),
            command_output: Mutex::new("ok".into()),
            ask_answer: Mutex::new(None),
            replace_error: Mutex::new(None),
            apply_regions_to_disk: AtomicBool::new(true),
        }
    }
}

impl ScriptedFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_approvals(self) -> Self {
        self.approve.store(false, Ordering::SeqCst);
        self
    }

    pub fn answer_no(self) -> Self {
        self.yes_or_no_answer.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_command_output(self, output: impl Into<String>) -> Self {
        *self.command_output.lock().unwrap() = output.into();
        self
    }

    pub fn with_ask_answer(self, answer: impl Into<String>) -> Self {
        *self.ask_answer.lock().unwrap() = Some(answer.into());
        self
    }

    pub fn with_replace_error(self, err: impl Into<String>) -> Self {
        *self.replace_error.lock().unwrap() = Some(err.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Apply `regions` to the file the way the editor does: split into
    /// lines preserving endings, then apply bottom-up so earlier line
    /// numbers stay valid.
    fn apply_to_disk(path: &Path, regions: &[Region]) -> Result<(), String> {
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let mut lines = split_keep_ends(&content);

        let mut ordered: Vec<&Region> = regions.iter().collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0));
        for (start, end, replacement) in ordered {
            let start_idx = start.saturating_sub(1);
            let end_idx = (end.saturating_sub(1)).min(lines.len());
            if start_idx > lines.len() || start_idx > end_idx {
                return Err(format!("invalid region {start}..{end}"));
            }
            lines.splice(start_idx..end_idx, std::iter::once(replacement.clone()));
        }
        std::fs::write(path, lines.concat()).map_err(|e| e.to_string())
    }
}

fn split_keep_ends(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, b) in s.bytes().enumerate() {
        if b == b'\n' {
            out.push(s[start..=i].to_string());
            start = i + 1;
        }
    }
    if start < s.len() {
        out.push(s[start..].to_string());
    }
    out
}

#[async_trait]
impl Frontend for ScriptedFrontend {
    async fn stream_chunk(
        &self,
        session: &str,
        content: &str,
        role: StreamRole,
        tool_id: Option<&str>,
        tool_name: Option<&str>,
    ) {
        self.record(RecordedCall::StreamChunk {
            session: session.into(),
            content: content.into(),
            role,
            tool_id: tool_id.map(Into::into),
            tool_name: tool_name.map(Into::into),
        });
    }

    async fn interaction_finished(&self, session: &str) {
        self.record(RecordedCall::InteractionFinished(session.into()));
    }

    async fn file_written_externally(&self, abs_path: &Path) {
        self.record(RecordedCall::FileWrittenExternally(abs_path.to_path_buf()));
    }

    async fn completion_signalled(&self, session: &str, text: &str, command: Option<&str>) {
        self.record(RecordedCall::CompletionSignalled {
            session: session.into(),
            text: text.into(),
            command: command.map(Into::into),
        });
    }

    async fn clear_local_buffer(&self, session: &str) {
        self.record(RecordedCall::ClearLocalBuffer(session.into()));
    }

    async fn message(&self, text: &str) {
        self.record(RecordedCall::Message(text.into()));
    }

    async fn request_tool_approval(
        &self,
        session: &str,
        tool_name: &str,
        _args: &serde_json::Value,
    ) -> bool {
        self.record(RecordedCall::ApprovalRequested {
            session: session.into(),
            tool_name: tool_name.into(),
        });
        self.approve.load(Ordering::SeqCst)
    }

    async fn execute_command(&self, session: &str, command: &str) -> anyhow::Result<String> {
        self.record(RecordedCall::ExecuteCommand {
            session: session.into(),
            command: command.into(),
        });
        Ok(self.command_output.lock().unwrap().clone())
    }

    async fn replace_regions(&self, abs_path: &Path, regions: &[Region]) -> Result<(), String> {
        self.record(RecordedCall::ReplaceRegions {
            path: abs_path.to_path_buf(),
            regions: regions.to_vec(),
        });
        if let Some(err) = self.replace_error.lock().unwrap().clone() {
            return Err(err);
        }
        if self.apply_regions_to_disk.load(Ordering::SeqCst) {
            Self::apply_to_disk(abs_path, regions)?;
        }
        Ok(())
    }

    async fn ask_user(&self, session: &str, question: &str, _options: &[String]) -> Option<String> {
        self.record(RecordedCall::AskUser {
            session: session.into(),
            question: question.into(),
        });
        self.ask_answer.lock().unwrap().clone()
    }

    async fn yes_or_no(&self, question: &str) -> bool {
        self.record(RecordedCall::YesOrNo(question.into()));
        self.yes_or_no_answer.load(Ordering::SeqCst)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keep_ends_preserves_newlines() {
        assert_eq!(split_keep_ends("a\nb\n"), vec!["a\n", "b\n"]);
        assert_eq!(split_keep_ends("a\nb"), vec!["a\n", "b"]);
        assert!(split_keep_ends("").is_empty());
    }

    #[tokio::test]
    async fn replace_regions_applies_bottom_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.py");
        std::fs::write(&path, "line1\nline2\nline3\n").unwrap();

        let fe = ScriptedFrontend::new();
        // Two disjoint single-line replacements; applying top-down naively
        // would shift the second range.
        fe.replace_regions(
            &path,
            &[(1, 2, "L1\n".into()), (3, 4, "L3\n".into())],
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "L1\nline2\nL3\n");
    }

    #[tokio::test]
    async fn scripted_denial_and_recording() {
        let fe = ScriptedFrontend::new().deny_approvals();
        let ok = fe
            .request_tool_approval("/s", "execute_command", &serde_json::json!({}))
            .await;
        assert!(!ok);
        assert!(matches!(
            fe.calls()[0],
            RecordedCall::ApprovalRequested { ref tool_name, .. } if tool_name == "execute_command"
        ));
    }

    #[tokio::test]
    async fn replace_error_short_circuits_disk_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        std::fs::write(&path, "keep\n").unwrap();

        let fe = ScriptedFrontend::new().with_replace_error("buffer modified");
        let res = fe.replace_regions(&path, &[(1, 2, "gone\n".into())]).await;
        assert_eq!(res, Err("buffer modified".into()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep\n");
    }
}
