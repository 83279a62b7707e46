// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod scripted;

pub use scripted::{RecordedCall, ScriptedFrontend};

use std::path::Path;

use async_trait::async_trait;

use emigo_protocol::StreamRole;

/// One line-range replacement: 1-based inclusive start line, 1-based
/// exclusive end line, replacement text.
pub type Region = (usize, usize, String);

/// The editor frontend, as seen from the backend.
///
/// Notification methods are fire-and-forget; the request/response methods
/// (`request_tool_approval`, `execute_command`, `replace_regions`,
/// `ask_user`, `yes_or_no`) block until the editor answers.  The transport
/// behind this trait is the editor channel; tests substitute
/// [`ScriptedFrontend`].
#[async_trait]
pub trait Frontend: Send + Sync {
    /// Stream a chunk of assistant output or tool-call JSON to the editor.
    async fn stream_chunk(
        &self,
        session: &str,
        content: &str,
        role: StreamRole,
        tool_id: Option<&str>,
        tool_name: Option<&str>,
    );

    /// The current interaction ended (any status).
    async fn interaction_finished(&self, session: &str);

    /// A file was modified on disk behind the editor's back; the editor may
    /// want to revert buffers visiting it.
    async fn file_written_externally(&self, abs_path: &Path);

    /// The agent called `attempt_completion`.
    async fn completion_signalled(&self, session: &str, text: &str, command: Option<&str>);

    /// Ask the editor to clear its local chat buffer for the session.
    async fn clear_local_buffer(&self, session: &str);

    /// Show a transient status message.
    async fn message(&self, text: &str);

    /// Ask the user to approve a tool invocation.  `false` denies.
    async fn request_tool_approval(
        &self,
        session: &str,
        tool_name: &str,
        args: &serde_json::Value,
    ) -> bool;

    /// Run a shell command under the editor's control and return its output.
    async fn execute_command(&self, session: &str, command: &str) -> anyhow::Result<String>;

    /// Apply disjoint line-range replacements to a file, bottom-up, in one
    /// atomic editor operation.  `Err` carries the editor-side error text.
    async fn replace_regions(&self, abs_path: &Path, regions: &[Region]) -> Result<(), String>;

    /// Present a question with optional canned options.  `None` means the
    /// user cancelled or gave no answer.
    async fn ask_user(&self, session: &str, question: &str, options: &[String]) -> Option<String>;

    /// Simple yes/no confirmation.
    async fn yes_or_no(&self, question: &str) -> bool;
}
