// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod builtin;
mod policy;
mod registry;
mod repomap;
mod result;
mod tool;

pub use builtin::default_registry;
pub use builtin::{
    AskFollowupQuestionTool, AttemptCompletionTool, ExecuteCommandTool, ListFilesTool,
    ListRepomapTool, ReadFileTool, ReplaceInFileTool, SearchFilesTool, WriteToFileTool,
};
pub use policy::ApprovalPolicy;
pub use registry::{ToolRegistry, ToolSchema};
pub use repomap::RepoMapProvider;
pub use result::{
    format_err, format_ok, COMPLETION_SIGNALLED, TOOL_DENIED, TOOL_ERROR_PREFIX,
    TOOL_RESULT_OUTPUT_PREFIX, TOOL_RESULT_SUCCESS,
};
pub use tool::{Tool, ToolContext};
