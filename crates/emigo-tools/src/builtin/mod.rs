// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod ask_followup_question;
mod attempt_completion;
mod execute_command;
mod list_files;
mod list_repomap;
mod read_file;
mod replace_in_file;
mod search_files;
mod write_to_file;

pub use ask_followup_question::AskFollowupQuestionTool;
pub use attempt_completion::AttemptCompletionTool;
pub use execute_command::ExecuteCommandTool;
pub use list_files::ListFilesTool;
pub use list_repomap::ListRepomapTool;
pub use read_file::ReadFileTool;
pub use replace_in_file::ReplaceInFileTool;
pub use search_files::SearchFilesTool;
pub use write_to_file::WriteToFileTool;

use crate::registry::ToolRegistry;

/// Registry with every builtin tool registered.
pub fn default_registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(ExecuteCommandTool);
    reg.register(ReadFileTool);
    reg.register(WriteToFileTool);
    reg.register(ReplaceInFileTool);
    reg.register(ListFilesTool);
    reg.register(SearchFilesTool);
    reg.register(AskFollowupQuestionTool);
    reg.register(AttemptCompletionTool);
    reg.register(ListRepomapTool);
    reg
}

// ─── Shared test fixtures ────────────────────────────────────────────────────
