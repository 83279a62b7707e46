// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::result::{format_err, COMPLETION_SIGNALLED};
use crate::tool::{require_str, Tool, ToolContext};

/// Signals that the task is done.  Returns the completion sentinel, which
/// ends the interaction on both sides of the worker boundary.
pub struct AttemptCompletionTool;

#[async_trait]
impl Tool for AttemptCompletionTool {
    fn name(&self) -> &str {
        "attempt_completion"
    }

    fn description(&self) -> &str {
        "Present the final result of the task to the user. Call this once the \
         task is complete; optionally include a command that demonstrates the \
         result."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "result": {
                    "type": "string",
                    "description": "Final result description shown to the user"
                },
                "command": {
                    "type": "string",
                    "description": "Optional shell command demonstrating the result"
                }
            },
            "required": ["result"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: &Value) -> String {
        let result = match require_str(params, "result", self.name()) {
            Ok(r) => r.to_string(),
            Err(e) => return format_err(e),
        };
        let command = params.get("command").and_then(|v| v.as_str());

        ctx.frontend
            .completion_signalled(&ctx.session_id(), &result, command)
            .await;
        COMPLETION_SIGNALLED.to_string()
    }
}
