// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::result::{format_err, format_ok, TOOL_RESULT_OUTPUT_PREFIX};
use crate::tool::{require_str, Tool, ToolContext};

/// Runs a shell command through the editor, which owns the terminal and can
/// capture output reliably.
pub struct ExecuteCommandTool;

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the session directory and return its \
         output. Use non-interactive commands only."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    async fn execute(&self, ctx: &ToolContext, params: &Value) -> String {
        let command = match require_str(params, "command", self.name()) {
            Ok(c) => c.to_string(),
            Err(e) => return format_err(e),
        };

        debug!(cmd = %command, session = %ctx.session_id(), "executing command via editor");
        match ctx.frontend.execute_command(&ctx.session_id(), &command).await {
            Ok(output) => format_ok(format!("{TOOL_RESULT_OUTPUT_PREFIX}{output}")),
            Err(e) => format_err(format!("Error executing command: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testutil::context_with_files;
    use emigo_frontend::RecordedCall;
    use serde_json::json;

    #[tokio::test]
    async fn command_output_is_wrapped_with_prefix() {
        let (_dir, mut ctx, _) = context_with_files(&[]);
        let fe = std::sync::Arc::new(
            emigo_frontend::ScriptedFrontend::new().with_command_output("total 0\n"),
        );
        ctx.frontend = fe.clone();

        let result = ExecuteCommandTool
            .execute(&ctx, &json!({"command": "ls -l"}))
            .await;
        assert!(result.starts_with(crate::TOOL_RESULT_SUCCESS));
        assert!(result.contains("Tool output:\ntotal 0"));
        assert!(matches!(
            fe.calls()[0],
            RecordedCall::ExecuteCommand { ref command, .. } if command == "ls -l"
        ));
    }

    #[tokio::test]
    async fn missing_command_is_an_error() {
        let (_dir, ctx, _fe) = context_with_files(&[]);
        let result = ExecuteCommandTool.execute(&ctx, &json!({})).await;
        assert!(result.contains("Missing required parameter 'command'"));
    }

    #[test]
    fn requires_approval() {
        assert_eq!(ExecuteCommandTool.default_policy(), ApprovalPolicy::Ask);
    }
}
