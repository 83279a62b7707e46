// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use emigo_session::ChatFileError;

use crate::result::{format_err, format_ok};
use crate::tool::{require_str, Tool, ToolContext};

/// Adds a file to the chat context and refreshes its cache.  The content
/// itself reaches the model through the environment details block, not the
/// tool result.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file and add it to the chat context. Its current content then \
         appears in the environment details of every following turn."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Session-relative path of the file to read"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: &Value) -> String {
        let path = match require_str(params, "path", self.name()) {
            Ok(p) => p.to_string(),
            Err(e) => return format_err(e),
        };

        let mut session = ctx.session.lock().await;
        match session.add_chat_file(&path) {
            Ok(rel) => {
                ctx.frontend
                    .message(&format!("[Emigo] Added '{rel}' to context."))
                    .await;
                format_ok(format!("File '{rel}' read and added to context."))
            }
            Err(ChatFileError::AlreadyPresent(rel)) => {
                // Already in context: just make sure the cache is fresh.
                session.update_cache(&rel, None);
                format_ok(format!("File '{rel}' read and added to context."))
            }
            Err(e) => format_err(format!("Error reading file: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testutil::context_with_files;
    use serde_json::json;

    #[tokio::test]
    async fn read_file_adds_to_context_and_caches() {
        let (_dir, ctx, _fe) = context_with_files(&[("a.txt", "hello\n")]);
        let result = ReadFileTool.execute(&ctx, &json!({"path": "a.txt"})).await;
        assert!(result.contains("read and added to context"));

        let mut session = ctx.session.lock().await;
        assert_eq!(session.chat_files(), &["a.txt".to_string()]);
        assert_eq!(session.cached_content("a.txt").as_deref(), Some("hello\n"));
    }

    #[tokio::test]
    async fn reading_twice_is_not_an_error() {
        let (_dir, ctx, _fe) = context_with_files(&[("a.txt", "x")]);
        ReadFileTool.execute(&ctx, &json!({"path": "a.txt"})).await;
        let second = ReadFileTool.execute(&ctx, &json!({"path": "a.txt"})).await;
        assert!(second.starts_with(crate::TOOL_RESULT_SUCCESS));
        assert_eq!(ctx.session.lock().await.chat_files().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let (_dir, ctx, _fe) = context_with_files(&[]);
        let result = ReadFileTool.execute(&ctx, &json!({"path": "nope.txt"})).await;
        assert!(result.starts_with(crate::TOOL_ERROR_PREFIX));
        assert!(result.contains("File not found"));
    }

    #[tokio::test]
    async fn missing_parameter_is_an_error() {
        let (_dir, ctx, _fe) = context_with_files(&[]);
        let result = ReadFileTool.execute(&ctx, &json!({})).await;
        assert!(result.contains("Missing required parameter 'path'"));
    }
}
