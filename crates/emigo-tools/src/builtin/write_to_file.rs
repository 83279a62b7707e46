// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::result::{format_err, format_ok};
use crate::tool::{require_str, Tool, ToolContext};

/// Overwrites (or creates) a file with the given content.
pub struct WriteToFileTool;

#[async_trait]
impl Tool for WriteToFileTool {
    fn name(&self) -> &str {
        "write_to_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it (and any parent directories) if \
         needed and overwriting it otherwise. Prefer replace_in_file for \
         targeted edits to existing files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Session-relative path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Complete new file content"
                }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    async fn execute(&self, ctx: &ToolContext, params: &Value) -> String {
        let path = match require_str(params, "path", self.name()) {
            Ok(p) => p.to_string(),
            Err(e) => return format_err(e),
        };
        let content = match require_str(params, "content", self.name()) {
            Ok(c) => c.to_string(),
            Err(e) => return format_err(e),
        };

        let mut session = ctx.session.lock().await;
        let rel = match session.resolve_rel(&path) {
            Ok(r) => r,
            Err(e) => return format_err(e.to_string()),
        };
        let abs = session.root().join(&rel);

        if let Some(parent) = abs.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return format_err(format!("Error creating directories for '{rel}': {e}"));
            }
        }
        if let Err(e) = tokio::fs::write(&abs, &content).await {
            session.invalidate_cache(Some(&rel));
            return format_err(format!("Error writing file: {e}"));
        }
        debug!(file = %rel, bytes = content.len(), "wrote file");

        // Let the editor know so buffers visiting the file can be reverted.
        ctx.frontend.file_written_externally(&abs).await;
        session.update_cache(&rel, Some(content));

        format_ok(format!("File '{rel}' written successfully."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testutil::context_with_files;
    use emigo_frontend::RecordedCall;
    use serde_json::json;

    #[tokio::test]
    async fn writes_file_and_updates_cache() {
        let (dir, ctx, fe) = context_with_files(&[]);
        let result = WriteToFileTool
            .execute(&ctx, &json!({"path": "sub/new.txt", "content": "data\n"}))
            .await;
        assert!(result.starts_with(crate::TOOL_RESULT_SUCCESS), "{result}");

        assert_eq!(
            std::fs::read_to_string(dir.path().join("sub/new.txt")).unwrap(),
            "data\n"
        );
        assert_eq!(
            ctx.session.lock().await.cached_content("sub/new.txt").as_deref(),
            Some("data\n")
        );
        assert!(fe
            .calls()
            .iter()
            .any(|c| matches!(c, RecordedCall::FileWrittenExternally(_))));
    }

    #[tokio::test]
    async fn empty_content_is_allowed() {
        let (dir, ctx, _fe) = context_with_files(&[]);
        let result = WriteToFileTool
            .execute(&ctx, &json!({"path": "empty.txt", "content": ""}))
            .await;
        assert!(result.starts_with(crate::TOOL_RESULT_SUCCESS));
        assert!(dir.path().join("empty.txt").exists());
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let (_dir, ctx, _fe) = context_with_files(&[]);
        let result = WriteToFileTool.execute(&ctx, &json!({"path": "x.txt"})).await;
        assert!(result.contains("Missing required parameter 'content'"));
    }

    #[tokio::test]
    async fn path_outside_session_is_rejected() {
        let (_dir, ctx, _fe) = context_with_files(&[]);
        let result = WriteToFileTool
            .execute(&ctx, &json!({"path": "../escape.txt", "content": "x"}))
            .await;
        assert!(result.starts_with(crate::TOOL_ERROR_PREFIX));
        assert!(result.contains("outside session directory"));
    }

    #[test]
    fn requires_approval() {
        assert_eq!(WriteToFileTool.default_policy(), ApprovalPolicy::Ask);
    }
}
